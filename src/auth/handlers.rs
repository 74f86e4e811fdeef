use crate::{
    auth::{
        auth::AuthUser,
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    error::{AppError, AppResult, is_duplicate_key},
    model::{
        role::Role,
        user::{MIN_PASSWORD_LEN, PROFILE_COLUMNS, User, UserProfile, normalize_email},
    },
    models::{ChangePasswordReq, Claims, LoginReqDto, LoginResponse, RegisterReq, TokenPair, TokenType},
    utils::{email_cache, email_filter},
};
use actix_web::{HttpRequest, HttpResponse, web};
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument, warn};

/// Validated fields for a new account.
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub department: Option<String>,
    pub designation: Option<String>,
    pub phone: Option<String>,
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl NewAccount {
    pub fn validate(
        name: &str,
        email: &str,
        password: &str,
        role: Role,
        department: Option<String>,
        designation: Option<String>,
        phone: Option<String>,
    ) -> AppResult<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::bad_request("Name must not be empty"));
        }
        let email =
            normalize_email(email).ok_or_else(|| AppError::bad_request("Invalid email address"))?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::bad_request(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        Ok(Self {
            name: name.to_string(),
            email,
            password: password.to_string(),
            role,
            department: non_blank(department),
            designation: non_blank(designation),
            phone: non_blank(phone),
        })
    }
}

/// true  => email AVAILABLE
/// false => email TAKEN
pub async fn is_email_available(email: &str, pool: &MySqlPool) -> bool {
    let email = email.to_lowercase();

    // 1️⃣ Cuckoo filter: fast negative
    if !email_filter::might_exist(&email) {
        return true;
    }

    // 2️⃣ Moka cache: fast positive
    if email_cache::is_taken(&email).await {
        return false;
    }

    // 3️⃣ Database fallback
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ? LIMIT 1)",
    )
    .bind(&email)
    .fetch_one(pool)
    .await
    .unwrap_or(true); // fail-safe

    if exists {
        email_cache::mark_taken(&email).await;
        return false;
    }

    true
}

/// Inserts a new account and updates the availability filter and cache.
pub async fn insert_user(account: &NewAccount, pool: &MySqlPool) -> AppResult<u64> {
    if !is_email_available(&account.email, pool).await {
        return Err(AppError::conflict("Email already registered"));
    }

    let hashed = hash_password(&account.password)
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))?;

    let result = sqlx::query(
        r#"
        INSERT INTO users (name, email, password, role_id, department, designation, phone, joining_date)
        VALUES (?, ?, ?, ?, ?, ?, ?, CURDATE())
        "#,
    )
    .bind(&account.name)
    .bind(&account.email)
    .bind(hashed)
    .bind(account.role.id())
    .bind(&account.department)
    .bind(&account.designation)
    .bind(&account.phone)
    .execute(pool)
    .await;

    match result {
        Ok(done) => {
            email_filter::insert(&account.email);
            email_cache::mark_taken(&account.email).await;
            Ok(done.last_insert_id())
        }
        Err(e) if is_duplicate_key(&e) => Err(AppError::conflict("Email already registered")),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_profile(pool: &MySqlPool, user_id: u64) -> AppResult<UserProfile> {
    sqlx::query_as::<_, UserProfile>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM users WHERE id = ?"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("User not found"))
}

async fn store_refresh_token(pool: &MySqlPool, claims: &Claims) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(claims.user_id)
    .bind(&claims.jti)
    .bind(claims.exp as i64)
    .execute(pool)
    .await?;
    Ok(())
}

fn issue_pair(config: &Config, user_id: u64, email: &str, role: u8) -> AppResult<(String, String, Claims)> {
    let access_token =
        generate_access_token(user_id, email, role, &config.jwt_secret, config.access_token_ttl)
            .map_err(|e| AppError::Internal(format!("token encoding failed: {e}")))?;
    let (refresh_token, refresh_claims) =
        generate_refresh_token(user_id, email, role, &config.jwt_secret, config.refresh_token_ttl)
            .map_err(|e| AppError::Internal(format!("token encoding failed: {e}")))?;
    Ok((access_token, refresh_token, refresh_claims))
}

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Self-service registration; always creates an employee account.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterReq,
    responses(
        (status = 201, description = "Account created", body = Object, example = json!({
            "message": "User registered successfully", "id": 12
        })),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Email already registered")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_register", skip(pool, body), fields(email = %body.email))]
pub async fn register(body: web::Json<RegisterReq>, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let body = body.into_inner();
    let account = NewAccount::validate(
        &body.name,
        &body.email,
        &body.password,
        Role::Employee,
        body.department,
        body.designation,
        body.phone,
    )?;

    let id = insert_user(&account, pool.get_ref()).await?;
    info!(user_id = id, "User registered");

    Ok(HttpResponse::Created().json(json!({
        "message": "User registered successfully",
        "id": id
    })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 400, description = "Email or password missing"),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account inactive")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(email = %user.email)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    info!("Login request received");

    // 1️⃣ Basic validation
    if user.email.trim().is_empty() || user.password.is_empty() {
        info!("Validation failed: empty email or password");
        return Err(AppError::bad_request("Email and password are required"));
    }
    let email = user.email.trim().to_lowercase();

    // 2️⃣ Fetch user
    debug!("Fetching user from database");
    let db_user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, name, email, password, role_id, department, designation, phone,
               joining_date, status, last_login_at, created_at
        FROM users
        WHERE email = ?
        "#,
    )
    .bind(&email)
    .fetch_optional(pool.get_ref())
    .await?;

    let Some(db_user) = db_user else {
        info!("Invalid credentials: user not found");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    };

    // 3️⃣ Verify password
    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    if !db_user.is_active() {
        warn!(user_id = db_user.id, "Login attempt on inactive account");
        return Err(AppError::forbidden("Account is inactive"));
    }

    // 4️⃣ Tokens
    let (access_token, refresh_token, refresh_claims) =
        issue_pair(&config, db_user.id, &db_user.email, db_user.role_id)?;

    debug!(user_id = db_user.id, jti = %refresh_claims.jti, "Storing refresh token");
    store_refresh_token(pool.get_ref(), &refresh_claims).await?;

    // 5️⃣ Update last_login_at (non-fatal)
    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(db_user.id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }

    info!(user_id = db_user.id, "Login successful");

    Ok(HttpResponse::Ok().json(LoginResponse {
        access_token,
        refresh_token,
        user: db_user.into(),
    }))
}

/// The guarded revoke must hit exactly one row, otherwise another request
/// already rotated this token.
fn claim_rotation(rows_affected: u64, user_id: u64) -> AppResult<()> {
    if rows_affected == 0 {
        warn!(user_id, "Refresh token reused during rotation");
        return Err(AppError::Unauthorized("Token revoked".into()));
    }
    Ok(())
}

/// Rotates a refresh token: the presented one is revoked and a new pair issued.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Missing, invalid or revoked refresh token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let token = bearer(&req).ok_or_else(|| AppError::Unauthorized("No token".into()))?;

    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| AppError::Unauthorized("Invalid token".into()))?;

    if claims.token_type != TokenType::Refresh {
        return Err(AppError::Unauthorized("Refresh token required".into()));
    }

    // 🔍 find refresh token in DB
    let record = sqlx::query_as::<_, (u64, bool)>(
        "SELECT id, revoked FROM refresh_tokens WHERE jti = ?",
    )
    .bind(&claims.jti)
    .fetch_optional(pool.get_ref())
    .await?;

    let record_id = match record {
        Some((id, false)) => id,
        Some((_, true)) => {
            warn!(user_id = claims.user_id, "Revoked refresh token presented");
            return Err(AppError::Unauthorized("Token revoked".into()));
        }
        None => return Err(AppError::Unauthorized("Unknown token".into())),
    };

    // current role and status, not the ones frozen in the old token
    let profile = fetch_profile(pool.get_ref(), claims.user_id).await.map_err(|_| {
        AppError::Unauthorized("Account no longer exists".into())
    })?;
    if profile.status != "active" {
        return Err(AppError::forbidden("Account is inactive"));
    }

    // 🔥 revoke old refresh token; only one concurrent rotation wins
    let revoked = sqlx::query(
        "UPDATE refresh_tokens SET revoked = TRUE WHERE id = ? AND revoked = FALSE",
    )
    .bind(record_id)
    .execute(pool.get_ref())
    .await?;
    claim_rotation(revoked.rows_affected(), claims.user_id)?;

    // 🔄 issue new pair
    let (access_token, refresh_token, new_claims) =
        issue_pair(&config, profile.id, &profile.email, profile.role_id)?;
    store_refresh_token(pool.get_ref(), &new_claims).await?;

    Ok(HttpResponse::Ok().json(TokenPair {
        access_token,
        refresh_token,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Refresh token revoked (idempotent)")),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> HttpResponse {
    let Some(token) = bearer(&req) else {
        return HttpResponse::NoContent().finish();
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) if c.token_type == TokenType::Refresh => c,
        _ => return HttpResponse::NoContent().finish(),
    };

    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token");
    }

    HttpResponse::NoContent().finish()
}

#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Current user", body = UserProfile),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn me(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let profile = fetch_profile(pool.get_ref(), auth.user_id).await?;
    Ok(HttpResponse::Ok().json(profile))
}

#[utoipa::path(
    put,
    path = "/api/me/password",
    request_body = ChangePasswordReq,
    responses(
        (status = 200, description = "Password changed; all sessions signed out"),
        (status = 400, description = "New password too short"),
        (status = 401, description = "Current password wrong")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn change_password(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    body: web::Json<ChangePasswordReq>,
) -> AppResult<HttpResponse> {
    if body.new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let (current_hash,) = sqlx::query_as::<_, (String,)>("SELECT password FROM users WHERE id = ?")
        .bind(auth.user_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    if verify_password(&body.current_password, &current_hash).is_err() {
        return Err(AppError::Unauthorized("Current password is incorrect".into()));
    }

    let hashed = hash_password(&body.new_password)
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))?;

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE users SET password = ? WHERE id = ?")
        .bind(hashed)
        .bind(auth.user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = ?")
        .bind(auth.user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(user_id = auth.user_id, email = %auth.email, "Password changed");
    Ok(HttpResponse::Ok().json(json!({ "message": "Password changed" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test as actix_test};
    use sqlx::mysql::MySqlPoolOptions;

    fn lazy_pool() -> MySqlPool {
        MySqlPoolOptions::new()
            .connect_lazy(&Config::for_tests().database_url)
            .unwrap()
    }

    #[test]
    fn new_account_validation() {
        let ok = NewAccount::validate(
            " Jane ",
            "Jane@Company.com",
            "longenough",
            Role::Employee,
            Some("  ".into()),
            None,
            Some(" 123 ".into()),
        )
        .unwrap();
        assert_eq!(ok.name, "Jane");
        assert_eq!(ok.email, "jane@company.com");
        assert_eq!(ok.department, None);
        assert_eq!(ok.phone.as_deref(), Some("123"));

        assert!(NewAccount::validate("", "a@b.co", "longenough", Role::Employee, None, None, None).is_err());
        assert!(NewAccount::validate("A", "nope", "longenough", Role::Employee, None, None, None).is_err());
        assert!(NewAccount::validate("A", "a@b.co", "short", Role::Employee, None, None, None).is_err());
    }

    #[test]
    fn losing_rotation_race_is_unauthorized() {
        assert!(claim_rotation(1, 7).is_ok());
        assert!(matches!(claim_rotation(0, 7), Err(AppError::Unauthorized(_))));
    }

    #[actix_web::test]
    async fn register_rejects_short_password_before_touching_db() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .route("/auth/register", web::post().to(register)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/auth/register")
            .set_json(json!({"name": "Jane", "email": "jane@company.com", "password": "123"}))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn login_requires_both_fields() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(Config::for_tests()))
                .route("/auth/login", web::post().to(login)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({"email": "  ", "password": ""}))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn refresh_rejects_access_tokens() {
        let config = Config::for_tests();
        let token = generate_access_token(1, "a@b.co", 1, &config.jwt_secret, 60).unwrap();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(config))
                .route("/auth/refresh", web::post().to(refresh_token)),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/auth/refresh")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn logout_without_token_is_no_content() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(Config::for_tests()))
                .route("/auth/logout", web::post().to(logout)),
        )
        .await;

        let req = actix_test::TestRequest::post().uri("/auth/logout").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }
}
