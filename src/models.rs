use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub username: String,
    pub password_hash: String,
    pub is_staff: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Course {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub owner: String,
}

/// A lesson may exist without a course; `course`, when set, must reference an
/// existing Course (checked at the API layer on create/update).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Lesson {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub preview: Option<String>,
    pub video_link: Option<String>,
    pub course: Option<u64>,
    pub owner: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Transfer,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Card => "card",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cash" => Some(PaymentMethod::Cash),
            "transfer" => Some(PaymentMethod::Transfer),
            "card" => Some(PaymentMethod::Card),
            _ => None,
        }
    }
}

/// Amount and currency live with the gateway call, not the record.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Payment {
    pub id: u64,
    pub date: DateTime<Utc>,
    pub paid_course: Option<u64>,
    pub paid_lesson: Option<u64>,
    pub payment_method: PaymentMethod,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CourseSubscription {
    pub id: u64,
    pub user: String,
    pub course: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthPayload {
    pub sub: String, // username
    pub exp: usize,
}
