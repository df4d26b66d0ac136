pub mod change;
pub mod debounce;
pub mod editor;
pub mod error;
pub mod host;
pub mod interpolate;
pub mod playback;
pub mod project;
pub mod recording;
pub mod serialize;
pub mod session;
pub mod store;

// Re-export key types for easier usage
pub use change::*;
pub use debounce::{Clock, ManualClock, SystemClock};
pub use editor::{Motion, RopeDocument};
pub use error::*;
pub use host::DocumentHost;
pub use interpolate::{MAX_INTERPOLATED_LEN, interpolate, is_typing_burst};
pub use playback::*;
pub use project::*;
pub use recording::{Recorder, RecorderOptions};
pub use serialize::{Rehydrate, serialize};
pub use session::*;
pub use store::*;
