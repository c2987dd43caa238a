pub mod tools;
pub mod turn;

pub use tools::{memory_tool_definition, MemoryCommand, ToolDispatcher, MEMORY_TOOL};
pub use turn::{run_turn, TurnError, TurnOutcome, MAX_TOOL_LOOPS};
