use crate::{
    api::{attendance, batch, chat, employee, export, leave_request, project, report, task, worksheet},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use anyhow::{Context, Result};
use std::sync::Arc;

type Limiter = Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>;

/// Per-route rate limiters, built once at startup so every worker shares
/// the same counters.
#[derive(Clone)]
pub struct Limiters {
    login: Limiter,
    register: Limiter,
    refresh: Limiter,
    logout: Limiter,
    protected: Limiter,
}

fn build_limiter(name: &str, requests_per_min: u32) -> Result<Limiter> {
    let requests_per_min = requests_per_min.max(1);
    let cfg = GovernorConfigBuilder::default()
        .milliseconds_per_request((60_000 / u64::from(requests_per_min)).max(1))
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .with_context(|| format!("invalid rate limit for {name}"))?;
    Ok(Arc::new(Governor::new(&cfg)))
}

impl Limiters {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            login: build_limiter("login", config.rate_login_per_min)?,
            register: build_limiter("register", config.rate_register_per_min)?,
            refresh: build_limiter("refresh", config.rate_refresh_per_min)?,
            // logout keeps its own counters
            logout: build_limiter("logout", config.rate_refresh_per_min)?,
            protected: build_limiter("protected", config.rate_protected_per_min)?,
        })
    }
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limiters: &Limiters) {
    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(limiters.login.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(limiters.register.clone())
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(limiters.refresh.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(limiters.logout.clone())
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(limiters.protected.clone()) // rate limiting
            // /me
            .service(web::resource("/me").route(web::get().to(handlers::me)))
            .service(web::resource("/me/password").route(web::put().to(handlers::change_password)))
            .service(
                web::scope("/employees")
                    .service(
                        web::resource("")
                            .route(web::post().to(employee::create_employee))
                            .route(web::get().to(employee::list_employees)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(employee::get_employee))
                            .route(web::put().to(employee::update_employee))
                            .route(web::delete().to(employee::delete_employee)),
                    ),
            )
            .service(
                web::scope("/attendance")
                    .service(web::resource("").route(web::get().to(attendance::list_attendance)))
                    .service(web::resource("/check-in").route(web::post().to(attendance::check_in)))
                    .service(web::resource("/check-out").route(web::post().to(attendance::check_out)))
                    .service(web::resource("/today").route(web::get().to(attendance::today)))
                    .service(web::resource("/me").route(web::get().to(attendance::my_attendance))),
            )
            .service(
                web::scope("/leaves")
                    .service(
                        web::resource("")
                            .route(web::get().to(leave_request::leave_list))
                            .route(web::post().to(leave_request::create_leave)),
                    )
                    // fixed segments before /{id}
                    .service(web::resource("/me").route(web::get().to(leave_request::my_leaves)))
                    .service(web::resource("/balance").route(web::get().to(leave_request::leave_balance)))
                    .service(web::resource("/{id}").route(web::get().to(leave_request::get_leave)))
                    .service(
                        web::resource("/{id}/approve")
                            .route(web::put().to(leave_request::approve_leave)),
                    )
                    .service(
                        web::resource("/{id}/reject")
                            .route(web::put().to(leave_request::reject_leave)),
                    )
                    .service(
                        web::resource("/{id}/cancel")
                            .route(web::put().to(leave_request::cancel_leave)),
                    ),
            )
            .service(
                web::scope("/projects")
                    .service(
                        web::resource("")
                            .route(web::post().to(project::create_project))
                            .route(web::get().to(project::list_projects)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(project::get_project))
                            .route(web::put().to(project::update_project))
                            .route(web::delete().to(project::delete_project)),
                    )
                    .service(
                        web::resource("/{id}/members")
                            .route(web::post().to(project::add_project_members)),
                    )
                    .service(
                        web::resource("/{id}/members/{user_id}")
                            .route(web::delete().to(project::remove_project_member)),
                    ),
            )
            .service(
                web::scope("/tasks")
                    .service(
                        web::resource("")
                            .route(web::post().to(task::create_task))
                            .route(web::get().to(task::list_tasks)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(task::get_task))
                            .route(web::put().to(task::update_task))
                            .route(web::delete().to(task::delete_task)),
                    )
                    .service(web::resource("/{id}/status").route(web::put().to(task::update_task_status))),
            )
            .service(
                web::scope("/chat")
                    .service(web::resource("/messages").route(web::post().to(chat::send_message)))
                    .service(
                        web::resource("/conversations/{user_id}")
                            .route(web::get().to(chat::conversation)),
                    )
                    .service(web::resource("/contacts").route(web::get().to(chat::contacts)))
                    .service(web::resource("/unread").route(web::get().to(chat::unread_count))),
            )
            .service(
                web::scope("/worksheets")
                    .service(web::resource("").route(web::get().to(worksheet::list_worksheets)))
                    .service(web::resource("/today").route(web::get().to(worksheet::today_worksheet)))
                    .service(
                        web::resource("/today/entries/{slot}")
                            .route(web::put().to(worksheet::upsert_entry)),
                    )
                    .service(web::resource("/today/breaks").route(web::post().to(worksheet::add_break)))
                    .service(
                        web::resource("/today/submit").route(web::post().to(worksheet::submit_worksheet)),
                    )
                    .service(web::resource("/me").route(web::get().to(worksheet::my_worksheets)))
                    .service(web::resource("/{id}").route(web::get().to(worksheet::get_worksheet))),
            )
            .service(
                web::scope("/batches")
                    .service(
                        web::resource("")
                            .route(web::post().to(batch::create_batch))
                            .route(web::get().to(batch::list_batches)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(batch::get_batch))
                            .route(web::put().to(batch::update_batch))
                            .route(web::delete().to(batch::delete_batch)),
                    )
                    .service(web::resource("/{id}/members").route(web::post().to(batch::add_batch_members)))
                    .service(
                        web::resource("/{id}/members/{user_id}")
                            .route(web::delete().to(batch::remove_batch_member)),
                    )
                    .service(web::resource("/{id}/materials").route(web::post().to(batch::add_material)))
                    .service(
                        web::resource("/{id}/materials/{material_id}")
                            .route(web::delete().to(batch::delete_material)),
                    )
                    .service(web::resource("/{id}/tasks").route(web::post().to(batch::create_batch_task))),
            )
            .service(
                web::scope("/reports")
                    .service(web::resource("/dashboard").route(web::get().to(report::dashboard)))
                    .service(web::resource("/attendance").route(web::get().to(report::attendance_report)))
                    .service(
                        web::resource("/attendance/trend")
                            .route(web::get().to(report::attendance_trend_report)),
                    )
                    .service(web::resource("/leaves").route(web::get().to(report::leave_report)))
                    .service(web::resource("/tasks").route(web::get().to(report::task_report)))
                    .service(web::resource("/me").route(web::get().to(report::my_report))),
            )
            .service(
                web::scope("/exports")
                    .service(web::resource("/attendance").route(web::get().to(export::export_attendance)))
                    .service(web::resource("/employees").route(web::get().to(export::export_employees)))
                    .service(web::resource("/tasks").route(web::get().to(export::export_tasks)))
                    .service(web::resource("/leaves").route(web::get().to(export::export_leaves))),
            ),
    );
}

// LOGIN
//  ├─ access_token (ACCESS_TOKEN_TTL, 15 min)
//  └─ refresh_token (REFRESH_TOKEN_TTL, 7 days)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ returns a new pair, old refresh token revoked

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiters_build_from_defaults() {
        assert!(Limiters::from_config(&Config::for_tests()).is_ok());
    }

    #[test]
    fn logout_does_not_share_login_counters() {
        let limiters = Limiters::from_config(&Config::for_tests()).unwrap();
        assert!(!Arc::ptr_eq(&limiters.login, &limiters.logout));
        assert!(!Arc::ptr_eq(&limiters.refresh, &limiters.logout));
    }

    #[test]
    fn zero_rate_is_clamped() {
        assert!(build_limiter("test", 0).is_ok());
    }
}
