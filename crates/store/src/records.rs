use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{Record, RecordInput};

const LEGACY_MEDIA_PREFIX: &str = "/img/";
const MEDIA_PREFIX: &str = "/images/";

fn default_true() -> bool {
    true
}

fn required(field: &str, value: String) -> Result<String, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(format!("missing required field: {}", field));
    }
    Ok(value.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn non_negative(field: &str, value: f64) -> Result<f64, String> {
    if !value.is_finite() || value < 0.0 {
        return Err(format!("{} must be a non-negative number", field));
    }
    Ok(value)
}

/// Rewrites the legacy `/img/` prefix to `/images/`.
pub fn media_path(value: Option<String>) -> Option<String> {
    optional(value).map(|path| match path.strip_prefix(LEGACY_MEDIA_PREFIX) {
        Some(rest) => format!("{}{}", MEDIA_PREFIX, rest),
        None => path,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub last_name: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub birth_date: NaiveDate,
    pub email: String,
    pub phone: Option<String>,
    pub is_subscribed: bool,
    pub photo: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientInput {
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub middle_name: Option<String>,
    pub birth_date: NaiveDate,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub is_subscribed: bool,
    #[serde(default)]
    pub photo: Option<String>,
}

impl RecordInput for ClientInput {
    fn normalized(self) -> Result<Self, String> {
        let email = required("email", self.email)?;
        if !email.contains('@') {
            return Err("email must be a valid address".to_string());
        }
        Ok(Self {
            last_name: required("last_name", self.last_name)?,
            first_name: required("first_name", self.first_name)?,
            middle_name: optional(self.middle_name),
            birth_date: self.birth_date,
            email,
            phone: optional(self.phone),
            is_subscribed: self.is_subscribed,
            photo: media_path(self.photo),
        })
    }
}

impl Record for Client {
    type Input = ClientInput;

    const COLLECTION: &'static str = "clients";
    const LABEL: &'static str = "client";
    const MEDIA_FIELD: &'static str = "photo";

    fn id(&self) -> i64 {
        self.id
    }

    fn from_input(id: i64, input: ClientInput) -> Self {
        Self {
            id,
            last_name: input.last_name,
            first_name: input.first_name,
            middle_name: input.middle_name,
            birth_date: input.birth_date,
            email: input.email,
            phone: input.phone,
            is_subscribed: input.is_subscribed,
            photo: input.photo,
        }
    }

    fn set_media(&mut self, path: Option<String>) {
        self.photo = path;
    }

    fn unique_key(&self) -> Option<&str> {
        Some(self.email.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStatus {
    #[default]
    Accepted,
    InProgress,
    Completed,
    Canceled,
}

impl RepairStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RepairStatus::Accepted => "accepted",
            RepairStatus::InProgress => "in_progress",
            RepairStatus::Completed => "completed",
            RepairStatus::Canceled => "canceled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "accepted" => Some(RepairStatus::Accepted),
            "in_progress" => Some(RepairStatus::InProgress),
            "completed" => Some(RepairStatus::Completed),
            "canceled" => Some(RepairStatus::Canceled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repair {
    pub id: i64,
    pub client_name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub brand: String,
    pub model: String,
    pub issue_description: String,
    pub repair_cost: f64,
    pub status: RepairStatus,
    pub photo: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepairInput {
    #[serde(default)]
    pub client_name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub issue_description: String,
    pub repair_cost: f64,
    #[serde(default)]
    pub status: RepairStatus,
    #[serde(default)]
    pub photo: Option<String>,
}

impl RecordInput for RepairInput {
    fn normalized(self) -> Result<Self, String> {
        Ok(Self {
            client_name: required("client_name", self.client_name)?,
            kind: required("type", self.kind)?,
            brand: required("brand", self.brand)?,
            model: required("model", self.model)?,
            issue_description: required("issue_description", self.issue_description)?,
            repair_cost: non_negative("repair_cost", self.repair_cost)?,
            status: self.status,
            photo: media_path(self.photo),
        })
    }
}

impl Record for Repair {
    type Input = RepairInput;

    const COLLECTION: &'static str = "repairs";
    const LABEL: &'static str = "repair";
    const MEDIA_FIELD: &'static str = "photo";

    fn id(&self) -> i64 {
        self.id
    }

    fn from_input(id: i64, input: RepairInput) -> Self {
        Self {
            id,
            client_name: input.client_name,
            kind: input.kind,
            brand: input.brand,
            model: input.model,
            issue_description: input.issue_description,
            repair_cost: input.repair_cost,
            status: input.status,
            photo: input.photo,
        }
    }

    fn set_media(&mut self, path: Option<String>) {
        self.photo = path;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Smartwatch {
    pub id: i64,
    pub brand: String,
    pub model: String,
    pub color: String,
    pub display_type: String,
    pub battery_life: i32,
    pub price: f64,
    pub in_stock: bool,
    pub photo: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmartwatchInput {
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub display_type: String,
    pub battery_life: i32,
    pub price: f64,
    #[serde(default = "default_true")]
    pub in_stock: bool,
    #[serde(default)]
    pub photo: Option<String>,
}

impl RecordInput for SmartwatchInput {
    fn normalized(self) -> Result<Self, String> {
        if self.battery_life < 0 {
            return Err("battery_life must be a non-negative number".to_string());
        }
        Ok(Self {
            brand: required("brand", self.brand)?,
            model: required("model", self.model)?,
            color: required("color", self.color)?,
            display_type: required("display_type", self.display_type)?,
            battery_life: self.battery_life,
            price: non_negative("price", self.price)?,
            in_stock: self.in_stock,
            photo: media_path(self.photo),
        })
    }
}

impl Record for Smartwatch {
    type Input = SmartwatchInput;

    const COLLECTION: &'static str = "smartwatches";
    const LABEL: &'static str = "smartwatch";
    const MEDIA_FIELD: &'static str = "photo";

    fn id(&self) -> i64 {
        self.id
    }

    fn from_input(id: i64, input: SmartwatchInput) -> Self {
        Self {
            id,
            brand: input.brand,
            model: input.model,
            color: input.color,
            display_type: input.display_type,
            battery_life: input.battery_life,
            price: input.price,
            in_stock: input.in_stock,
            photo: input.photo,
        }
    }

    fn set_media(&mut self, path: Option<String>) {
        self.photo = path;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jewelry {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub material: String,
    pub weight: f64,
    pub price: f64,
    pub in_stock: bool,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JewelryInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub material: String,
    pub weight: f64,
    pub price: f64,
    #[serde(default = "default_true")]
    pub in_stock: bool,
    #[serde(default)]
    pub image: Option<String>,
}

impl RecordInput for JewelryInput {
    fn normalized(self) -> Result<Self, String> {
        Ok(Self {
            name: required("name", self.name)?,
            category: required("category", self.category)?,
            material: required("material", self.material)?,
            weight: non_negative("weight", self.weight)?,
            price: non_negative("price", self.price)?,
            in_stock: self.in_stock,
            image: media_path(self.image),
        })
    }
}

impl Record for Jewelry {
    type Input = JewelryInput;

    const COLLECTION: &'static str = "jewelry";
    const LABEL: &'static str = "jewelry item";
    const MEDIA_FIELD: &'static str = "image";

    fn id(&self) -> i64 {
        self.id
    }

    fn from_input(id: i64, input: JewelryInput) -> Self {
        Self {
            id,
            name: input.name,
            category: input.category,
            material: input.material,
            weight: input.weight,
            price: input.price,
            in_stock: input.in_stock,
            image: input.image,
        }
    }

    fn set_media(&mut self, path: Option<String>) {
        self.image = path;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub client_name: String,
    pub order_date: DateTime<Utc>,
    pub total_amount: f64,
    pub status: String,
    pub delivery_address: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderInput {
    #[serde(default)]
    pub client_name: String,
    pub order_date: DateTime<Utc>,
    pub total_amount: f64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub delivery_address: String,
    #[serde(default)]
    pub image: Option<String>,
}

impl RecordInput for OrderInput {
    fn normalized(self) -> Result<Self, String> {
        Ok(Self {
            client_name: required("client_name", self.client_name)?,
            order_date: self.order_date,
            total_amount: non_negative("total_amount", self.total_amount)?,
            status: required("status", self.status)?,
            delivery_address: required("delivery_address", self.delivery_address)?,
            image: media_path(self.image),
        })
    }
}

impl Record for Order {
    type Input = OrderInput;

    const COLLECTION: &'static str = "orders";
    const LABEL: &'static str = "order";
    const MEDIA_FIELD: &'static str = "image";

    fn id(&self) -> i64 {
        self.id
    }

    fn from_input(id: i64, input: OrderInput) -> Self {
        Self {
            id,
            client_name: input.client_name,
            order_date: input.order_date,
            total_amount: input.total_amount,
            status: input.status,
            delivery_address: input.delivery_address,
            image: input.image,
        }
    }

    fn set_media(&mut self, path: Option<String>) {
        self.image = path;
    }
}
