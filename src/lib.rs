pub mod im;

// 重新导出常用类型和函数，方便外部使用
pub use im::{
    backend::{ChatBackend, RestBackend},
    client::{ChaturwayClient, ClientConfig},
    conversation::{ConversationSummary, ConversationTarget},
    events::{ClientEvent, Notification, ServerEvent},
    listener::{ChatListener, EmptyChatListener},
    login_async,
    message::{Message, MessageDraft},
    poll::{NewPoll, Poll},
    socket::{MemoryConnector, SocketConnector, SocketIoConnector},
    LoginData,
};
