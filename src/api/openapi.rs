//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::config::{ADMIN_KEY_HEADER, API_KEY_HEADER};
use crate::{api, error, forms, models};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "MozTrap",
        version = "0.1.0",
        description = "Test case management: products, cases and suites, test runs and the results testers record against them"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Health
        api::health::health,
        api::health::ready,
        // Accounts
        api::accounts::login_info,
        api::accounts::login,
        api::accounts::logout,
        api::accounts::password_change,
        api::accounts::password_reset,
        api::accounts::password_reset_confirm,
        api::accounts::register,
        api::accounts::activate,
        api::accounts::set_username,
        api::accounts::browserid_verify,
        api::accounts::openid_complete,
        api::accounts::me,
        // User management
        api::manage_users::list_users,
        api::manage_users::create_user,
        api::manage_users::get_user,
        api::manage_users::delete_user,
        api::manage_users::activate_user,
        api::manage_users::deactivate_user,
        api::manage_users::create_apikey,
        api::manage_users::list_apikeys,
        api::manage_users::revoke_apikey,
        api::manage_users::list_roles,
        api::manage_users::create_role,
        api::manage_users::get_preferences,
        api::manage_users::update_preferences,
        // Products
        api::products::list_products,
        api::products::create_product,
        api::products::get_product,
        api::products::list_versions,
        api::products::create_version,
        api::products::list_environments,
        api::products::create_environment,
        // Library
        api::library::create_case,
        api::library::create_case_version,
        api::library::get_case_version,
        api::library::list_suites,
        api::library::create_suite,
        api::library::get_suite,
        // Runs
        api::runs::list_runs,
        api::runs::add_form_choices,
        api::runs::create_run,
        api::runs::get_run,
        api::runs::update_run,
        api::runs::edit_form_choices,
        api::runs::activate_run,
        api::runs::deactivate_run,
        // Run tests
        api::runtests::run_tests,
        api::runtests::run_test_item,
        api::runtests::result_action,
        api::runtests::clone_series,
    ),
    components(
        schemas(
            error::ErrorResponse,
            models::ActionResponse,
            models::Message,
            models::MessageLevel,
            models::Pagination,
            models::ObjectStatus,
            models::ResultStatus,
            models::StepResultStatus,
            models::UserResponse,
            forms::users::LoginData,
            api::accounts::LoginFlavour,
            api::accounts::LoginResponse,
            models::execution::ResultAction,
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness"),
        (name = "Accounts", description = "Login, registration and passwords"),
        (name = "Users", description = "Users, roles, preferences and API keys"),
        (name = "Products", description = "Products, versions and environments"),
        (name = "Library", description = "Test cases and suites"),
        (name = "Runs", description = "Test run management"),
        (name = "Run Tests", description = "Executing runs and recording results")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Header security schemes: user API keys and the bootstrap admin key.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};

        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(API_KEY_HEADER))),
            );
            components.add_security_scheme(
                "admin_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(ADMIN_KEY_HEADER))),
            );
        }
    }
}
