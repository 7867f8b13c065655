mod adapter_error;
mod change_group_error;
mod conflict_error;
mod session_error;
mod storage_error;
mod tandem_error;

pub use adapter_error::{AdapterError, AdapterErrorKind};
pub use change_group_error::ChangeGroupError;
pub use conflict_error::ConflictError;
pub use session_error::SessionError;
pub use storage_error::StorageError;
pub use tandem_error::{TandemError, TandemResult};
