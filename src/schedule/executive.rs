use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Executive {
    pub id: String,
    pub title: String,
    pub email: String,
    /// As typed in settings: empty, an address, or `primary`.
    pub calendar_id: String,
    pub order: u32,
}

impl Executive {
    pub fn has_calendar(&self) -> bool {
        !self.calendar_id.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutiveUpdate {
    pub title: Option<String>,
    pub email: Option<String>,
    pub calendar_id: Option<String>,
    pub order: Option<u32>,
}

impl ExecutiveUpdate {
    pub fn apply(self, executive: &mut Executive) {
        if let Some(title) = self.title {
            executive.title = title;
        }
        if let Some(email) = self.email {
            executive.email = email;
        }
        if let Some(calendar_id) = self.calendar_id {
            executive.calendar_id = calendar_id;
        }
        if let Some(order) = self.order {
            executive.order = order;
        }
    }
}

const DEFAULT_TITLES: [&str; 5] = [
    "Director General",
    "Deputy Director General",
    "Deputy Director of Hospitals",
    "General Affairs Manager",
    "Deputy General Affairs Manager",
];

pub fn default_executives() -> Vec<Executive> {
    DEFAULT_TITLES
        .iter()
        .enumerate()
        .map(|(index, title)| Executive {
            id: format!("exec-{}", index + 1),
            title: title.to_string(),
            email: String::new(),
            calendar_id: String::new(),
            order: index as u32 + 1,
        })
        .collect()
}
