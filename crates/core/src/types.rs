use serde::{Deserialize, Deserializer, Serialize};

/// A traffic-splitting unit, stored as one JSON record under `campaign:<key>`.
///
/// Field names follow the record format shared with the admin tooling and
/// the analytics consumer, hence the PascalCase renames.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Campaign {
    #[serde(rename = "ID", default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub params: String,
    #[serde(default)]
    pub cycles_done: u64,
    /// Order matters: later eligible pages take precedence during selection.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub pages: Vec<Page>,
}

/// Records written by other tooling may carry `"Pages": null`.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Page>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Page>>::deserialize(deserializer)?.unwrap_or_default())
}

/// One destination variant of a campaign with its per-cycle quota.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Page {
    #[serde(rename = "ID", default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "URL", default)]
    pub url: String,
    #[serde(default)]
    pub cycle_hits_done: u32,
    #[serde(default)]
    pub cycle_hits_todo: u32,
}

impl Page {
    /// True while the page still has quota left in the current cycle.
    pub fn is_eligible(&self) -> bool {
        self.cycle_hits_done < self.cycle_hits_todo
    }
}

/// Analytics event pushed onto the task queue for the external consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    #[serde(rename = "CampaignPageID")]
    pub page_id: i64,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Type")]
    pub event_type: EventType,
    #[serde(rename = "Params", default)]
    pub params: Vec<AnalyticsParam>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsParam {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    pub value: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// A redirect was dispatched to the page.
    Hit,
    /// The landing page confirmed it was displayed.
    View,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Hit => "hit",
            EventType::View => "view",
        }
    }
}

impl AnalyticsParam {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Collapse request parameters to one entry per name, keeping the first
    /// value seen and the order in which names first appear.
    pub fn from_pairs<K, V>(pairs: &[(K, V)]) -> Vec<AnalyticsParam>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut params: Vec<AnalyticsParam> = Vec::with_capacity(pairs.len());
        for (name, value) in pairs {
            let name = name.as_ref();
            if params.iter().any(|p| p.name == name) {
                continue;
            }
            params.push(AnalyticsParam::new(name, value.as_ref()));
        }
        params
    }
}
