//! Confirmation message building.
//!
//! Templating and localization are external collaborators; this module
//! carries only the minimal subject/body builder the dispatcher needs.

/// A rendered confirmation message.
#[derive(Debug, Clone)]
pub struct ConfirmationMessage {
    /// Email subject line
    pub subject: String,
    /// HTML body
    pub html: String,
}

/// Build the confirmation message for a signup.
///
/// Unknown locales fall back to English.
pub fn confirmation_message(locale: &str, name: Option<&str>, base_url: &url::Url) -> ConfirmationMessage {
    let greeting_name = name.unwrap_or("there");
    let (subject, body) = match locale {
        "fr" => (
            "Confirmez votre inscription".to_string(),
            format!("<p>Bonjour {greeting_name},</p><p>Merci de confirmer votre inscription : <a href=\"{base_url}confirm\">confirmer</a></p>"),
        ),
        "es" => (
            "Confirma tu registro".to_string(),
            format!("<p>Hola {greeting_name},</p><p>Confirma tu registro aquí: <a href=\"{base_url}confirm\">confirmar</a></p>"),
        ),
        _ => (
            "Confirm your signup".to_string(),
            format!("<p>Hi {greeting_name},</p><p>Please confirm your signup: <a href=\"{base_url}confirm\">confirm</a></p>"),
        ),
    };

    ConfirmationMessage {
        subject,
        html: body,
    }
}
