//! Collaborative band-management board: workers × columns of sticky notes
//! kept in a realtime key-path store.
//!
//! The crate is split the same way the board behaves at runtime:
//! - `store`: key-path store contract plus the in-memory realtime store
//! - `lock`, `position`, `history`, `mutation`: concurrent editing coordination
//! - `snapshot`, `backup`, `presence`, `activity`: periodic and bulk state handling
//! - `view`, `ui_state`, `session`: client-side wiring around the above

pub mod activity;
pub mod backup;
pub mod clock;
pub mod config;
pub mod history;
pub mod lock;
pub mod mutation;
pub mod position;
pub mod presence;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod sync;
pub mod types;
pub mod ui_state;
pub mod view;
