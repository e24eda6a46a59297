//! Registered users and their cached FIRE projection.

pub type UserId = i64;

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
    pub fire_number: Option<f64>,
    pub time_to_fire: Option<f64>,
}
