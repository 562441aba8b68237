mod block;
mod event;
mod message;

pub use block::{AnimationControls, Block, Cell};
pub use event::{Event, Frame, ToolCall};
pub use message::{Message, MessageBody, MessageKind, Role, Thread};
