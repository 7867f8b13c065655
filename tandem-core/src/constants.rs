//! Stable reference names for built-in conflict types and resolution actions.
//!
//! Reference names are persisted in rules and conflicts, so these values
//! must never change.

use uuid::Uuid;

// --- Built-in conflict types ---

/// Catch-all type for unhandled adapter failures and exhausted retries.
pub const GENERIC_CONFLICT_TYPE: Uuid = Uuid::from_u128(0x6f1c_2a4e_0b1d_4c55_9a0e_5d0b_7c21_0001);

/// Raised when a change group holds an action the target endpoint cannot apply.
pub const UNSUPPORTED_CHANGE_ACTION_CONFLICT_TYPE: Uuid =
    Uuid::from_u128(0x6f1c_2a4e_0b1d_4c55_9a0e_5d0b_7c21_0002);

// --- Built-in resolution actions ---

/// Skip the conflicted change action (or the whole group when no action is linked).
pub const SKIP_ACTION: Uuid = Uuid::from_u128(0x3b7e_91f0_5d2a_4b8e_8f61_2c4d_0e9a_0101);

/// Re-run the conflicted change group on the next pass.
pub const RETRY_ACTION: Uuid = Uuid::from_u128(0x3b7e_91f0_5d2a_4b8e_8f61_2c4d_0e9a_0102);

/// Operator confirms the issue was fixed out of band; the original action proceeds.
pub const MANUAL_RESOLVED_ACTION: Uuid = Uuid::from_u128(0x3b7e_91f0_5d2a_4b8e_8f61_2c4d_0e9a_0103);
