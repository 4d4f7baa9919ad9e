//! The subset of the siren hypermedia format cnd speaks.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Entity<P = serde_json::Value> {
    #[serde(default)]
    pub class: Vec<String>,
    pub properties: Option<P>,
    #[serde(default)]
    pub entities: Vec<SubEntity>,
    #[serde(default)]
    pub links: Vec<Link>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl<P> Entity<P> {
    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|action| action.name == name)
    }

    pub fn link(&self, rel: &str) -> Option<&Link> {
        find_link(&self.links, rel)
    }

    pub fn properties(&self) -> anyhow::Result<&P> {
        self.properties.as_ref().ok_or_else(|| {
            anyhow::anyhow!("siren entity of class {:?} has no properties", self.class)
        })
    }
}

/// An entity embedded into another one, either in full or as a link.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct SubEntity {
    #[serde(default)]
    pub class: Vec<String>,
    #[serde(default)]
    pub rel: Vec<String>,
    pub href: Option<String>,
    pub properties: Option<serde_json::Value>,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl SubEntity {
    pub fn link(&self, rel: &str) -> Option<&Link> {
        find_link(&self.links, rel)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Link {
    #[serde(default)]
    pub class: Vec<String>,
    pub rel: Vec<String>,
    pub href: String,
}

fn find_link<'a>(links: &'a [Link], rel: &str) -> Option<&'a Link> {
    links
        .iter()
        .find(|link| link.rel.iter().any(|candidate| candidate == rel))
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Action {
    pub name: String,
    #[serde(default)]
    pub class: Vec<String>,
    #[serde(default)]
    pub method: Method,
    pub href: String,
    pub title: Option<String>,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Default for Method {
    fn default() -> Self {
        Method::Get
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Field {
    pub name: String,
    #[serde(default)]
    pub class: Vec<String>,
    #[serde(rename = "type")]
    pub field_type: Option<String>,
    pub value: Option<serde_json::Value>,
    pub title: Option<String>,
}

impl Field {
    pub fn has_classes(&self, classes: &[&str]) -> bool {
        classes
            .iter()
            .all(|wanted| self.class.iter().any(|class| class == wanted))
    }
}
