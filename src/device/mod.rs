//! # Lighting Device Client
//!
//! Everything the controller does with the panel device goes through
//! [`DeviceClient`]: token pairing, the identity probe, panel layout, power,
//! the change-notification stream and custom color effects.
//!
//! ```text
//! device/
//! ├── animation.rs  - color assignments and the custom effect encoder
//! ├── client.rs     - DeviceClient and its session state
//! ├── config.rs     - `[device]` settings
//! ├── error.rs      - DeviceError
//! ├── events.rs     - event stream reader
//! └── panels.rs     - panel ids, shapes and the layout inventory
//! ```
//!
//! ## Session
//!
//! The client starts `Unauthenticated`. A successful identity probe moves it
//! to `Authenticated`, an open event stream to `Streaming`. A failed
//! authenticated call only resets the session after a second probe fails
//! with something other than a transient transport error. A
//! closed event stream drops `Streaming` back to `Authenticated`.

pub mod animation;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod panels;

pub use animation::{ColorAssignment, Rgb, FRIEND_COLOR_KEY};
pub use client::{Callback, DeviceClient, SessionState};
pub use config::DeviceConfig;
pub use error::DeviceError;
pub use events::LAYOUT_EVENT_ID;
pub use panels::{PanelId, PanelInventory, ShapeClass};
