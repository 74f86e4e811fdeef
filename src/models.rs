use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::user::UserProfile;

#[derive(Deserialize, ToSchema)]
pub struct RegisterReq {
    #[schema(example = "Jane Doe")]
    pub name: String,
    #[schema(example = "jane@company.com", format = "email")]
    pub email: String,
    #[schema(example = "s3cure-pass")]
    pub password: String,
    #[schema(example = "Engineering")]
    pub department: Option<String>,
    #[schema(example = "Backend Developer")]
    pub designation: Option<String>,
    #[schema(example = "+8801712345678")]
    pub phone: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginReqDto {
    #[schema(example = "jane@company.com", format = "email")]
    pub email: String,
    #[schema(example = "s3cure-pass")]
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ChangePasswordReq {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserProfile,
}

#[derive(Serialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    /// account email
    pub sub: String,
    pub role: u8, // role id
    pub exp: usize,
    pub jti: String,

    pub token_type: TokenType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}
