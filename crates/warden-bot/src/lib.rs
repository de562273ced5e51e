pub mod cards;
pub mod context;
pub mod dialog;
pub mod error;
pub mod invoke;
pub mod processor;
pub mod queue;
pub mod router;
pub mod settings;

pub use context::TurnContext;
pub use dialog::{AuthOutcome, AuthenticationDialogEngine, DialogSettings};
pub use error::{DispatchFailure, HandlerError, SettingsError, TurnError};
pub use invoke::{InvokeMultiplexer, InvokeResponse, MessageExtensionHandler, TaskModuleHandler};
pub use processor::{TrustPolicy, TurnProcessor, TurnReport};
pub use queue::ConversationQueue;
pub use router::{
    AugmentedExecutor, CommandDescriptor, CommandHandler, CommandPattern, CommandRouter,
    DispatchOutcome, DispatchPath,
};
pub use settings::{HttpSettingsSource, SettingsRequest, SettingsSource, StaticSettings};
