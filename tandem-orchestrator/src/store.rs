use tandem_core::traits::{IChangeGroupStore, IConversionHistory, ISessionStateStore};

/// Everything a session worker persists: groups, session state and
/// conversion history. Implemented for any store providing all three.
pub trait SyncStore: IChangeGroupStore + ISessionStateStore + IConversionHistory {}

impl<T> SyncStore for T where T: IChangeGroupStore + ISessionStateStore + IConversionHistory {}
