pub mod codec;
pub mod command_tools;
pub mod document_tools;
pub mod edits;
pub mod error;
pub mod finish;
pub mod process;
pub mod registry;
pub mod search_tools;
pub mod traits;

pub use codec::PlainTextCodec;
pub use command_tools::{CommandToolConfig, RunCommandTool};
pub use document_tools::{default_output_path, document_tools, DocumentSession, DocumentToolConfig};
pub use edits::{apply_edits, DocumentEdit, EditFailure, EditReport};
pub use error::ToolError;
pub use finish::{FinishRecord, FinishSlot, FinishTool};
pub use process::{run_shell, ProcessOutput, ProcessSpec};
pub use registry::ToolRegistry;
pub use search_tools::{search_tools, EvidenceLog, SearchScope, SearchTool};
pub use traits::{Tool, ToolResult};
