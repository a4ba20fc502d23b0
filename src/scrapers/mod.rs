pub mod browser;
pub mod olx;
pub mod replay;
pub mod traits;

pub use browser::{ChromeLauncher, ChromeSession};
pub use olx::{olx_id, parse_price, BlockSignal, OlxSchema};
pub use replay::{ReplayLauncher, ReplayLog, ReplaySession};
pub use traits::{PageSession, SessionLauncher};
