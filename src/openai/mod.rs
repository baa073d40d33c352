mod core;
pub use self::core::{
    CompletionError, CompletionInvoker, FragmentStream, Message, OpenAiClient, Role,
    completion_stream,
};
