//! SeaORM entity definitions.

pub mod api_key;
pub mod case;
pub mod case_step;
pub mod case_version;
pub mod core_preferences;
pub mod environment;
pub mod product;
pub mod product_version;
pub mod product_version_environment;
pub mod registration_profile;
pub mod result;
pub mod role;
pub mod role_permission;
pub mod run;
pub mod run_case_version;
pub mod run_environment;
pub mod run_suite;
pub mod step_result;
pub mod suite;
pub mod suite_case;
pub mod user;
pub mod user_openid;
pub mod user_role;
