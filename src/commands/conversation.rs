//! Per-user conversation state.

use dashmap::DashMap;

use crate::session::UserIdentity;

/// Shortest accepted phone number, in digits.
pub const MIN_PHONE_DIGITS: usize = 10;

/// Longest accepted phone number, in digits.
pub const MAX_PHONE_DIGITS: usize = 11;

/// What the bot expects next from a user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Step {
    #[default]
    Idle,
    AwaitingPhone,
    AwaitingPassword {
        phone: String,
    },
}

/// One user's conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    pub step: Step,

    /// Phone number of the last successful login.
    pub logged_in_phone: Option<String>,
}

/// Conversations of every user that has talked to the bot.
#[derive(Debug, Default)]
pub struct Conversations {
    users: DashMap<UserIdentity, Conversation>,
}

impl Conversations {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the user's conversation, if one was started.
    #[must_use]
    pub fn get(&self, identity: UserIdentity) -> Option<Conversation> {
        self.users.get(&identity).map(|entry| entry.value().clone())
    }

    /// Moves the user to `step`, starting a conversation if needed.
    pub fn set_step(&self, identity: UserIdentity, step: Step) {
        self.users.entry(identity).or_default().step = step;
    }

    /// Records a successful login and ends the current step.
    pub fn logged_in(&self, identity: UserIdentity, phone: String) {
        let mut conversation = self.users.entry(identity).or_default();
        conversation.step = Step::Idle;
        conversation.logged_in_phone = Some(phone);
    }

    /// Forgets the user entirely. Returns whether anything was known.
    pub fn forget(&self, identity: UserIdentity) -> bool {
        self.users.remove(&identity).is_some()
    }
}

/// Checks a phone number typed by the user.
///
/// Returns the trimmed number, or the reply explaining what is wrong.
pub fn validate_phone(text: &str) -> Result<String, &'static str> {
    let phone = text.trim();
    if phone.is_empty() || !phone.chars().all(|c| c.is_ascii_digit()) {
        return Err("Invalid phone number. Please enter digits only.");
    }
    if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&phone.len()) {
        return Err("Invalid phone number. The phone number must be 10 or 11 digits long.");
    }
    Ok(phone.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_phone() {
        assert_eq!(validate_phone(" 08012345678 "), Ok("08012345678".to_owned()));
        assert_eq!(validate_phone("8012345678"), Ok("8012345678".to_owned()));
        assert!(validate_phone("+2348012345678").is_err());
        assert!(validate_phone("080-1234-5678").is_err());
        assert!(validate_phone("123456789").unwrap_err().contains("10 or 11"));
        assert!(validate_phone("080123456789").is_err());
        assert!(validate_phone("").unwrap_err().contains("digits only"));
    }

    #[test]
    fn test_login_flow_state() {
        let conversations = Conversations::new();
        let user = UserIdentity(1);
        assert!(conversations.get(user).is_none());

        conversations.set_step(user, Step::AwaitingPhone);
        conversations.set_step(
            user,
            Step::AwaitingPassword {
                phone: "08012345678".to_owned(),
            },
        );
        conversations.logged_in(user, "08012345678".to_owned());

        let conversation = conversations.get(user).unwrap();
        assert_eq!(conversation.step, Step::Idle);
        assert_eq!(conversation.logged_in_phone.as_deref(), Some("08012345678"));

        assert!(conversations.forget(user));
        assert!(!conversations.forget(user));
    }

    #[test]
    fn test_new_login_keeps_previous_phone() {
        let conversations = Conversations::new();
        let user = UserIdentity(2);
        conversations.logged_in(user, "08011111111".to_owned());
        conversations.set_step(user, Step::AwaitingPhone);

        let conversation = conversations.get(user).unwrap();
        assert_eq!(conversation.step, Step::AwaitingPhone);
        assert_eq!(conversation.logged_in_phone.as_deref(), Some("08011111111"));
    }
}
