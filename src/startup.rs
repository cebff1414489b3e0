use actix_web::dev::Server;
use actix_web::{middleware::Logger, web, App, HttpServer};
use std::net::TcpListener;

use crate::auth::SessionManager;
use crate::error::{AppError, ValidationError};
use crate::logger::LoggerMiddleware;
use crate::middleware::AccessGuard;
use crate::routes::{health_check, login, logout, profile, refresh};

pub fn run(listener: TcpListener, sessions: SessionManager) -> Result<Server, std::io::Error> {
    let signer = sessions.access_signer();
    let sessions = web::Data::new(sessions);

    let server = HttpServer::new(move || {
        // Malformed or incomplete bodies answer with the same 400 envelope
        let json_config = web::JsonConfig::default().error_handler(|err, _req| {
            tracing::debug!(error = %err, "Rejected request body");
            AppError::Validation(ValidationError::InvalidFormat("request body".to_string())).into()
        });

        App::new()
            // Global middleware
            .wrap(Logger::default())
            .wrap(LoggerMiddleware)

            // Shared state
            .app_data(sessions.clone())
            .app_data(json_config)

            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))

            // Protected routes (require a bearer access token)
            .service(
                web::resource("/auth/profile")
                    .wrap(AccessGuard::new(signer.clone()))
                    .route(web::get().to(profile)),
            )
            .service(
                web::resource("/auth/logout")
                    .wrap(AccessGuard::new(signer.clone()))
                    .route(web::post().to(logout)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
