//! API endpoint modules.

use actix_web::web;

pub mod accounts;
pub mod health;
pub mod library;
pub mod manage_users;
pub mod openapi;
pub mod products;
pub mod runs;
pub mod runtests;

pub use health::configure_health_routes;
pub use openapi::ApiDoc;

/// Mount every `/api/v1` route.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(configure_health_routes)
            .service(web::scope("/users").configure(accounts::configure_routes))
            .service(
                web::scope("/manage")
                    .configure(manage_users::configure_routes)
                    .configure(products::configure_routes)
                    .configure(library::configure_routes)
                    .configure(runs::configure_routes),
            )
            .service(web::scope("/runtests").configure(runtests::configure_routes)),
    );
}
