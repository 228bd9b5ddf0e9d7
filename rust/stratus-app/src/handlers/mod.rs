mod enabled;
mod heartbeat;
mod scopes;

pub use enabled::*;
pub use heartbeat::*;
pub use scopes::*;
