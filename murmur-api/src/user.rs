use uuid::Uuid;

/// Account identifier, as handed out by the wallet login (usually an address).
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> UserId {
        UserId(id.into())
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AuthToken(pub Uuid);

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Scholar,
    Guide,
    Anonymous,
}

impl Role {
    /// Maps the raw role list of an account: any `guide` role wins, every
    /// other logged-in account is a scholar.
    pub fn from_user_roles<S: AsRef<str>>(roles: &[S]) -> Role {
        match roles.iter().any(|r| r.as_ref() == "guide") {
            true => Role::Guide,
            false => Role::Scholar,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Role::Anonymous)
    }
}
