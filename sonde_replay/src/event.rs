use std::io::{self, Read};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sonde_infer::{InferError, Session};
use sonde_types::{Access, Reg, ThreadId};
use tracing::trace;

/// One callback from the instrumentation host, in the order it fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    Routine {
        address: u64,
        name: String,
    },
    Call {
        #[serde(default)]
        thread: ThreadId,
        // unresolved indirect target when missing
        target: Option<u64>,
        #[serde(default)]
        jump: bool,
        #[serde(default)]
        site: u64,
    },
    Ret {
        #[serde(default)]
        thread: ThreadId,
    },
    Access {
        #[serde(default)]
        thread: ThreadId,
        reg: Reg,
        access: Access,
        #[serde(default)]
        addr: u64,
    },
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub routines: u64,
    pub calls: u64,
    pub returns: u64,
    pub accesses: u64,
}

impl Event {
    pub fn apply(self, session: &mut Session, stats: &mut Stats) -> Result<(), InferError> {
        match self {
            Event::Routine { address, name } => {
                stats.routines += 1;
                session.register_routine(address, &name);
            },
            Event::Call {
                thread,
                target,
                jump,
                site,
            } => {
                stats.calls += 1;
                trace!(thread, site, ?target, jump, "call");
                session.on_call(thread, target, jump)?;
            },
            Event::Ret { thread } => {
                stats.returns += 1;
                session.on_return(thread);
            },
            Event::Access {
                thread,
                reg,
                access,
                addr,
            } => {
                stats.accesses += 1;
                trace!(thread, addr, %reg, ?access, "access");
                session.on_access(thread, reg, access);
            },
        }
        Ok(())
    }
}

pub type Events<'a> = Box<dyn Iterator<Item = Result<Event>> + 'a>;

/// Whitespace separated JSON objects, normally one per line.
pub fn read_json<'a, R: Read + 'a>(reader: R) -> Events<'a> {
    let stream = serde_json::Deserializer::from_reader(reader).into_iter::<Event>();
    Box::new(stream.enumerate().map(|(i, event)| {
        event.with_context(|| format!("malformed event #{}", i + 1))
    }))
}

/// Back to back bincode records.
pub fn read_bincode<'a, R: Read + 'a>(mut reader: R) -> Events<'a> {
    let mut index = 0usize;
    Box::new(std::iter::from_fn(move || {
        index += 1;
        match bincode::deserialize_from::<_, Event>(&mut reader) {
            Ok(event) => Some(Ok(event)),
            Err(err) => {
                if let bincode::ErrorKind::Io(e) = &*err {
                    if e.kind() == io::ErrorKind::UnexpectedEof {
                        return None;
                    }
                }
                Some(Err(anyhow::Error::new(err).context(format!("malformed event #{}", index))))
            },
        }
    }))
}
