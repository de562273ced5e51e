//! Fixed user-facing texts and the card payloads the dialog sends.
//!
//! Cards carry a stable `fallbackText` so clients without card support (and
//! tests) can tell them apart.

use serde_json::json;
use warden_channels::Attachment;

pub const LOGIN_FAILED_TEXT: &str = "Login was not successful please try again.";
pub const SIGNED_IN_TEXT: &str = "You are now signed in.";
pub const SIGNED_OUT_TEXT: &str = "You have been signed out.";
pub const CHAIN_UNAVAILABLE_TEXT: &str =
    "We could not reach the sign-in service. Please try again in a moment.";

pub const OAUTH_CARD_TYPE: &str = "application/vnd.microsoft.card.oauth";
pub const ADAPTIVE_CARD_TYPE: &str = "application/vnd.microsoft.card.adaptive";

pub const CONSENT_FALLBACK: &str = "Consent required";
pub const SIGNIN_REQUIRED_FALLBACK: &str = "Sign-in required";
pub const THANK_YOU_FALLBACK: &str = "Thank you";

/// Command id submitted by the consent card's button.
pub const CONSENT_COMMAND_ID: &str = "consent";

/// Platform sign-in card for `connection_name`.
pub fn oauth_card(connection_name: &str, text: &str, button: &str) -> Attachment {
    Attachment {
        content_type: OAUTH_CARD_TYPE.to_string(),
        content: json!({
            "text": text,
            "connectionName": connection_name,
            "buttons": [{ "type": "signin", "title": button, "value": "" }]
        }),
    }
}

pub fn consent_card() -> Attachment {
    adaptive(
        CONSENT_FALLBACK,
        "Workspace needs your consent to use your Microsoft account details.",
        Some(("Consent", CONSENT_COMMAND_ID)),
    )
}

pub fn signin_required_card() -> Attachment {
    adaptive(
        SIGNIN_REQUIRED_FALLBACK,
        "Your sign-in has expired or was revoked. Send any message to sign in again.",
        None,
    )
}

pub fn thank_you_card() -> Attachment {
    adaptive(
        THANK_YOU_FALLBACK,
        "Thank you. Workspace can now use your Microsoft account details.",
        None,
    )
}

fn adaptive(fallback: &str, body: &str, submit: Option<(&str, &str)>) -> Attachment {
    let mut content = json!({
        "type": "AdaptiveCard",
        "version": "1.4",
        "fallbackText": fallback,
        "body": [{ "type": "TextBlock", "text": body, "wrap": true }]
    });
    if let Some((title, command_id)) = submit {
        content["actions"] = json!([{
            "type": "Action.Submit",
            "title": title,
            "data": { "commandId": command_id }
        }]);
    }
    Attachment {
        content_type: ADAPTIVE_CARD_TYPE.to_string(),
        content,
    }
}

/// `fallbackText` of an adaptive card attachment.
pub fn fallback_of(attachment: &Attachment) -> Option<&str> {
    attachment.content.get("fallbackText").and_then(|v| v.as_str())
}
