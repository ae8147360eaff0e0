//! Template data built from a user-update event.

use serde::Serialize;

use crate::queue::{ChangeType, UserUpdateEvent};

/// Per change-type template data. Field order is the serialized order.
#[derive(Debug, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
enum TemplateData<'a> {
    Account {
        username: &'a str,
        confirmation_link: &'a str,
    },
    UsernameChange {
        new_username: &'a str,
        old_username: &'a str,
        confirmation_link: &'a str,
    },
    NewEmail {
        username: &'a str,
        new_email: &'a str,
        confirmation_link: &'a str,
    },
    OldEmail {
        username: &'a str,
        new_email: &'a str,
        old_email: &'a str,
        confirmation_link: &'a str,
    },
}

impl<'a> TemplateData<'a> {
    fn for_event(event: &'a UserUpdateEvent) -> Option<Self> {
        let username = event.display_name.as_deref().unwrap_or_default();
        let old_value = event.old_value.as_deref().unwrap_or_default();
        let new_value = event.new_value.as_deref().unwrap_or_default();
        let confirmation_link = event.confirmation_link.as_str();

        let data = match event.change_type {
            ChangeType::RegistrationConfirmation
            | ChangeType::PasswordReset
            | ChangeType::PasswordChange => TemplateData::Account {
                username,
                confirmation_link,
            },
            ChangeType::UsernameChange => TemplateData::UsernameChange {
                new_username: new_value,
                old_username: old_value,
                confirmation_link,
            },
            ChangeType::EmailChangeNew => TemplateData::NewEmail {
                username,
                new_email: new_value,
                confirmation_link,
            },
            ChangeType::EmailChangeOld => TemplateData::OldEmail {
                username,
                new_email: new_value,
                old_email: old_value,
                confirmation_link,
            },
            // No template content is defined for these yet.
            ChangeType::RoleChange | ChangeType::Unknown => return None,
        };

        Some(data)
    }
}

/// JSON template data for `event`, or an empty string when the change type
/// carries no content.
pub fn template_data(event: &UserUpdateEvent) -> serde_json::Result<String> {
    match TemplateData::for_event(event) {
        Some(data) => serde_json::to_string(&data),
        None => Ok(String::new()),
    }
}
