use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Permission {
    pub id: i64,
    pub trip_id: i64,
    pub user_id: i64,
    pub can_view: bool,
    pub can_edit: bool,
}

impl Permission {
    pub fn allows(&self, access: Access) -> bool {
        match access {
            Access::View => self.can_view,
            Access::Edit => self.can_edit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    View,
    Edit,
}

impl Access {
    pub fn as_str(&self) -> &'static str {
        match self {
            Access::View => "view",
            Access::Edit => "view & edit",
        }
    }
}

/// A permission on a trip held by someone other than its owner.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SharedPermission {
    pub user_id: i64,
    pub fname: String,
    pub lname: String,
    pub can_edit: bool,
}
