use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// Opaque password hash; never interpreted here.
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Medicine {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub dose: String,
    pub frequency: String,
}

/// Fields a user supplies when adding or editing a medicine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewMedicine {
    pub name: String,
    pub dose: String,
    pub frequency: String,
}

impl NewMedicine {
    pub fn new(
        name: impl Into<String>,
        dose: impl Into<String>,
        frequency: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            dose: dose.into(),
            frequency: frequency.into(),
        }
    }
}

impl From<Medicine> for NewMedicine {
    fn from(m: Medicine) -> Self {
        Self {
            name: m.name,
            dose: m.dose,
            frequency: m.frequency,
        }
    }
}
