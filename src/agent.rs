use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
        }
    }
}

// Backends send `ID` as either a string or a number.
fn product_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(Option::<RawId>::deserialize(deserializer)?.map(|raw| match raw {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    }))
}

/// A product as the backend describes it. Only the display fields are named;
/// everything else the backend attaches rides along in `extra`.
#[derive(Debug, Clone, Deserialize)]
pub struct Product {
    #[serde(rename = "ID", default, deserialize_with = "product_id")]
    pub id: Option<String>,
    #[serde(rename = "Model Name", default)]
    pub model_name: Option<String>,
    #[serde(rename = "Company Name", default)]
    pub company_name: Option<String>,
    #[serde(rename = "Capacity", default)]
    pub capacity: Option<i64>,
    #[serde(rename = "Max Price", default)]
    pub max_price: Option<i64>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Product {
    pub fn display_name(&self) -> &str {
        self.model_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or("Unnamed Product")
    }

    pub fn company_label(&self) -> &str {
        self.company_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or("N/A")
    }

    pub fn capacity_label(&self) -> String {
        match self.capacity {
            Some(gb) => gb.to_string(),
            None => "?".to_string(),
        }
    }

    pub fn price(&self) -> i64 {
        self.max_price.unwrap_or(0)
    }

    pub fn badge_letter(&self) -> char {
        self.display_name().chars().next().unwrap_or('?')
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpecialDeal {
    pub heading: String,
    pub deal_price: f64,
    #[serde(default)]
    pub products_involved: Vec<Product>,
}

#[derive(Serialize)]
struct ChatRequest {
    user_message: String,
    history: Vec<Turn>,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub text: String,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub special_deal: Option<SpecialDeal>,
}

#[derive(Clone)]
pub struct AgentClient {
    client: Client,
    url: String,
}

impl AgentClient {
    pub fn new(url: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.to_string(),
        }
    }

    pub async fn chat(&self, user_message: &str, history: &[Turn]) -> Result<ChatResponse> {
        let request = ChatRequest {
            user_message: user_message.to_string(),
            history: history.to_vec(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Agent request failed with status {}: {}", status, text));
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_id_accepts_numbers_and_strings() {
        let numeric: Product = serde_json::from_value(serde_json::json!({"ID": 1})).unwrap();
        assert_eq!(numeric.id.as_deref(), Some("1"));

        let text: Product = serde_json::from_value(serde_json::json!({"ID": "p-9"})).unwrap();
        assert_eq!(text.id.as_deref(), Some("p-9"));

        let missing: Product = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(missing.id.is_none());
    }

    #[test]
    fn product_display_fallbacks() {
        let bare: Product = serde_json::from_value(serde_json::json!({"ID": 4})).unwrap();
        assert_eq!(bare.display_name(), "Unnamed Product");
        assert_eq!(bare.company_label(), "N/A");
        assert_eq!(bare.capacity_label(), "?");
        assert_eq!(bare.price(), 0);
        assert_eq!(bare.badge_letter(), 'U');
    }

    #[test]
    fn product_keeps_unknown_fields() {
        let product: Product = serde_json::from_value(serde_json::json!({
            "ID": "7",
            "Model Name": "Pixelate 9",
            "ram": "8GB",
            "processor": "Octa-core",
        }))
        .unwrap();
        assert_eq!(product.extra.get("ram").and_then(|v| v.as_str()), Some("8GB"));
        assert_eq!(
            product.extra.get("processor").and_then(|v| v.as_str()),
            Some("Octa-core")
        );
    }

    #[test]
    fn chat_response_defaults_are_empty() {
        let reply: ChatResponse =
            serde_json::from_str(r#"{"text": "Hello there"}"#).unwrap();
        assert_eq!(reply.text, "Hello there");
        assert!(reply.audio_url.is_none());
        assert!(reply.products.is_empty());
        assert!(reply.special_deal.is_none());
    }

    #[test]
    fn chat_response_with_products_and_deal() {
        let reply: ChatResponse = serde_json::from_value(serde_json::json!({
            "text": "Here are some fans",
            "audio_url": "https://cdn.example.com/fan.wav",
            "products": [
                {"ID": 1, "Model Name": "CoolBreeze", "Capacity": 0, "Max Price": 1999}
            ],
            "special_deal": {
                "heading": "Bundle offer",
                "deal_price": 2499.0,
                "products_involved": [{"ID": 1, "Model Name": "CoolBreeze"}]
            }
        }))
        .unwrap();

        assert_eq!(reply.products.len(), 1);
        let fan = &reply.products[0];
        assert_eq!(fan.id.as_deref(), Some("1"));
        assert_eq!(fan.display_name(), "CoolBreeze");
        assert_eq!(fan.capacity_label(), "0");
        assert_eq!(fan.price(), 1999);

        let deal = reply.special_deal.unwrap();
        assert_eq!(deal.heading, "Bundle offer");
        assert_eq!(deal.products_involved.len(), 1);
    }

    #[test]
    fn roles_serialize_lowercase() {
        let turn = Turn::assistant("hi");
        let value = serde_json::to_value(&turn).unwrap();
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["content"], "hi");
    }
}
