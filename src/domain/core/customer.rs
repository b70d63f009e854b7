use derive_more::{Deref, Display, From};
use serde::{Deserialize, Serialize};

use crate::domain::{Entity, Id};

/// お客様ID(認証済みセッションから受け取る)
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From, Deref, Default,
)]
pub struct CustomerId(u64);

impl Id for CustomerId {
    type Inner = u64;
}

/// 認証済みのお客様
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    id: CustomerId,
    name: String,
    email: String,
    is_admin: bool,
}

impl Customer {
    pub fn new(id: CustomerId, name: String, email: String) -> Self {
        Self {
            id,
            name,
            email,
            is_admin: false,
        }
    }

    pub fn admin(id: CustomerId, name: String, email: String) -> Self {
        Self {
            is_admin: true,
            ..Self::new(id, name, email)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }
}

impl Entity for Customer {
    type Id = CustomerId;

    const ENTITY_NAME: &'static str = "customer";

    fn id(&self) -> Self::Id {
        self.id
    }
}
