pub mod clock;
pub mod ims;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ims::{ImsConnector, ImsOperation};
