use serde::{Deserialize, Serialize};

#[cfg(feature = "ts")]
use ts_rs::TS;

/// Profile payload of `GET /auth/user`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub id: String,
    /// The account username, which is the email address.
    pub username: String,
    #[serde(default)]
    pub email_confirmed: bool,
    #[serde(default)]
    pub user_type: Option<String>,
}

/// The signed-in user as held by the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    pub email_confirmed: bool,
    pub user_type: Option<String>,
}

impl From<UserProfile> for User {
    fn from(profile: UserProfile) -> Self {
        Self {
            id: profile.id,
            email: profile.username.clone(),
            username: profile.username,
            email_confirmed: profile.email_confirmed,
            user_type: profile.user_type,
        }
    }
}

impl User {
    /// Display label for presenters: the email, with an unverified marker
    pub fn display_name(&self) -> String {
        if self.email_confirmed {
            self.email.clone()
        } else {
            format!("{} (unverified)", self.email)
        }
    }
}
