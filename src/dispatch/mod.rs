//! Delegated collection: tasks are submitted to the remote worker fabric and
//! their responses are matched back by correlation id.

mod correlation;
mod descriptor;
mod dispatcher;
mod response;

pub use correlation::{CorrelationRegistry, PendingTask, Registration};
pub use descriptor::{TaskDescriptor, TaskPurpose, TaskResponse};
pub use dispatcher::{DispatchTicket, RemoteTaskDispatcher};
pub use response::{CompletionHandler, CompletionOutcome};
