pub mod classify;
pub mod error;
pub mod infer;
pub mod report;
pub mod session;
pub mod shadow;
pub mod stack;
pub mod table;

pub use classify::{Classifier, Verdict};
pub use error::{InferError, ReportError};
pub use infer::Tracker;
pub use session::{Session, SharedTable};
pub use stack::{Entry, Frame, ShadowStack};
pub use table::{FunctionRecord, FunctionTable};
