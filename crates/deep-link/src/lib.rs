//! Deep-link handling for the Lumen shell.
//!
//! Three pieces, in the order a link flows through them:
//!
//! - [`parse`] classifies a raw `appscheme://` URL into a [`ParsedDeepLink`].
//! - [`find_in_args`] pulls a link out of a process argument list (how
//!   Linux hands a link to a cold-started app).
//! - [`PendingBuffer`] holds accepted payloads until the window receiver has
//!   finished loading, then delivers each exactly once.

mod buffer;
mod error;
mod parser;
mod payload;

pub use buffer::{DeepLinkReceiver, PendingBuffer, Submission};
pub use error::{BufferError, DeliveryError};
pub use parser::{find_in_args, parse, LinkPath};
pub use payload::{
    DeepLinkPayload, OAuthCallbackBody, ParsedDeepLink, PayloadKind, SessionBody,
    VerificationBody, VerificationKind,
};
pub use shell_config_and_utils::URL_SCHEME;
