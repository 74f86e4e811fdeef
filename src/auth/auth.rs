use crate::config::Config;
use crate::error::AppError;
use crate::{
    auth::jwt::verify_token,
    model::role::Role,
    models::{Claims, TokenType},
};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    /// Builds the caller from verified claims; only access tokens qualify.
    pub fn from_claims(claims: Claims) -> Result<Self, AppError> {
        if claims.token_type != TokenType::Access {
            return Err(AppError::Unauthorized("Access token required".into()));
        }
        let role = Role::from_id(claims.role)
            .ok_or_else(|| AppError::Unauthorized("Invalid role".into()))?;

        Ok(AuthUser {
            user_id: claims.user_id,
            email: claims.sub,
            role,
        })
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(AppError::forbidden("Admin only"))
        }
    }

    pub fn require_hr_or_admin(&self) -> Result<(), AppError> {
        if self.role.is_manager() {
            Ok(())
        } else {
            Err(AppError::forbidden("HR/Admin only"))
        }
    }

    /// Managers may act on anyone; everybody else only on themselves.
    pub fn require_self_or_manager(&self, owner_id: u64) -> Result<(), AppError> {
        if self.role.is_manager() || self.user_id == owner_id {
            Ok(())
        } else {
            Err(AppError::forbidden("Not allowed to access this record"))
        }
    }

    pub fn is_manager(&self) -> bool {
        self.role.is_manager()
    }
}

fn extract(req: &HttpRequest) -> Result<AuthUser, AppError> {
    // set by auth_middleware on protected scopes
    if let Some(user) = req.extensions().get::<AuthUser>() {
        return Ok(user.clone());
    }

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Missing token".into()))?;

    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| AppError::Internal("Config missing".into()))?;

    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| AppError::Unauthorized("Invalid token".into()))?;

    AuthUser::from_claims(claims)
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(extract(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> AuthUser {
        AuthUser {
            user_id: 5,
            email: "x@y.io".into(),
            role,
        }
    }

    #[test]
    fn role_guards() {
        assert!(user(Role::Admin).require_admin().is_ok());
        assert!(user(Role::Hr).require_admin().is_err());
        assert!(user(Role::Hr).require_hr_or_admin().is_ok());
        assert!(user(Role::Employee).require_hr_or_admin().is_err());
    }

    #[test]
    fn employees_only_reach_their_own_records() {
        let employee = user(Role::Employee);
        assert!(employee.require_self_or_manager(5).is_ok());
        assert!(employee.require_self_or_manager(6).is_err());
        assert!(user(Role::Hr).require_self_or_manager(6).is_ok());
    }

    #[test]
    fn refresh_claims_are_not_a_session() {
        let claims = Claims {
            user_id: 1,
            sub: "a@b.co".into(),
            role: 1,
            exp: usize::MAX,
            jti: "j".into(),
            token_type: TokenType::Refresh,
        };
        assert!(matches!(AuthUser::from_claims(claims), Err(AppError::Unauthorized(_))));
    }
}
