mod change_group_store;
mod conflict_store;
mod conversion_history;
mod session_store;

pub use change_group_store::IChangeGroupStore;
pub use conflict_store::{IConflictStore, IRuleStore, RecordedConflict};
pub use conversion_history::IConversionHistory;
pub use session_store::ISessionStateStore;
