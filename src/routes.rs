// routes.rs - the HTTP surface
//
// Every resource lives under /api/v1; /api/v2 re-exposes the create endpoints.
// Paged routes get the normalizer first and the permission gate around it, so
// an unauthenticated request is refused before its query string is examined.

use axum::extract::{DefaultBodyLimit, Extension};
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, patch, post, put, MethodRouter};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{AppConfig, Environment};
use crate::database::models::{GeoLevel, ProfileKind, LEVELS};
use crate::filter::QueryRules;
use crate::handlers::{geo, groups, loans, media, members, mpesa, permissions, profiles, roles, system, users};
use crate::middleware::{guarded, paged};
use crate::state::AppState;

type Perms = &'static [&'static str];

/// Permission names guarding one profile kind's routes.
struct ProfilePerms {
    create: Perms,
    view: Perms,
    edit: Perms,
}

const AGENT_PERMS: ProfilePerms = ProfilePerms {
    create: &["create_agent"],
    view: &["view_agents"],
    edit: &["edit_agent"],
};

const OFFICER_PERMS: ProfilePerms = ProfilePerms {
    create: &["create_officer"],
    view: &["view_officers"],
    edit: &["edit_officer"],
};

const USER_SORT: QueryRules = QueryRules::new(&["first_name", "last_name"], "first_name");
const ROLE_SORT: QueryRules = QueryRules::new(&["role_name"], "role_name");
const PERMISSION_SORT: QueryRules = QueryRules::new(&["permission_name"], "permission_name");
const PROFILE_SORT: QueryRules = QueryRules::new(&["user_id"], "user_id");
const GROUP_SORT: QueryRules = QueryRules::new(&["group_name"], "group_name");
const LOAN_SORT: QueryRules = QueryRules::new(&["status"], "status");

/// The complete application router.
pub fn app(state: AppState) -> Router {
    let config = state.config.clone();

    Router::new()
        .route("/", get(system::root))
        .route("/health", get(system::health))
        .nest("/api/v1", v1(&state))
        .nest("/api/v2", v2(&state))
        .layer(DefaultBodyLimit::max(config.api.max_request_size_bytes))
        .layer(cors(&config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn v1(state: &AppState) -> Router<AppState> {
    let mut router = Router::new()
        .nest("/users", user_routes(state))
        .nest("/roles", role_routes(state))
        .nest("/permissions", permission_routes(state))
        .nest("/agents", profile_routes(state, ProfileKind::Agent, &AGENT_PERMS))
        .nest("/officers", profile_routes(state, ProfileKind::Officer, &OFFICER_PERMS))
        .nest("/members", member_routes(state))
        .nest("/groups", group_routes(state))
        .nest("/loans", loan_routes(state))
        .nest("/media", media_routes(state))
        .nest("/mpesa", mpesa_routes(state));

    for level in LEVELS.iter() {
        router = router.nest(&format!("/{}", level.path), geo_routes(state, level));
    }
    router
}

fn v2(state: &AppState) -> Router<AppState> {
    let gate = |route: MethodRouter<AppState>, required: Perms| guarded(route, state, required);

    let mut router = Router::new()
        .route("/users/register", post(users::register_post))
        .route("/roles/roles", gate(post(roles::role_post), &["create_role"]))
        .route("/permissions/create", gate(post(permissions::permission_post), &["create_permission"]))
        .route(
            "/agents/create",
            gate(post(profiles::profile_post), AGENT_PERMS.create).layer(Extension(ProfileKind::Agent)),
        )
        .route(
            "/officers/create",
            gate(post(profiles::profile_post), OFFICER_PERMS.create).layer(Extension(ProfileKind::Officer)),
        )
        .route("/members/create", gate(post(members::member_post), &["create_member"]))
        .route("/groups/create", gate(post(groups::group_post), &["create_group"]))
        .route("/loans/create", gate(post(loans::loan_post), &["create_loan"]))
        .route("/media/new", gate(post(media::upload_post), &["upload_media"]));

    for level in LEVELS.iter() {
        router = router.route(
            &format!("/{}/create", level.path),
            post(geo::node_post).layer(Extension(level)),
        );
    }
    router
}

/// One geography level; these routes carry no permission gate.
fn geo_routes(state: &AppState, level: &'static GeoLevel) -> Router<AppState> {
    let rules = QueryRules::new(level.sort_columns, level.name_column).with_config(&state.config.filter);

    let mut router = Router::new()
        .route("/create", post(geo::node_post))
        .route("/paginate", paged(get(geo::nodes_get), rules))
        .route("/by/:id", get(geo::node_get).patch(geo::node_patch).delete(geo::node_delete))
        .route("/all", get(geo::all_get))
        .route("/all/no-auth", get(geo::all_get));
    if let Some(children) = level.children {
        router = router.route(&format!("/by/{}/:id", children), get(geo::children_get));
    }
    router.layer(Extension(level))
}

fn user_routes(state: &AppState) -> Router<AppState> {
    let rules = USER_SORT.with_config(&state.config.filter);

    Router::new()
        .route("/register", post(users::register_post))
        .route("/activate-account/:token/:id", put(users::activate_put))
        .route("/forgot-password", post(users::forgot_password_post))
        .route("/reset-password/:token/:id", put(users::reset_password_put))
        .route("/login", post(users::login_post))
        .route("/refresh", post(users::refresh_post))
        .route("/paginate", guarded(paged(get(users::users_get), rules), state, &["view_users"]))
        .route("/by/month", get(users::monthly_get))
        .route("/by/count", get(users::count_get))
        .route(
            "/by/:id",
            guarded(get(users::user_get), state, &["view_users"]).merge(guarded(patch(users::user_patch), state, &["edit_user"])),
        )
        .route("/permissions", guarded(get(users::permissions_get), state, &[]))
}

fn role_routes(state: &AppState) -> Router<AppState> {
    let rules = ROLE_SORT.with_config(&state.config.filter);

    Router::new()
        .route("/create", guarded(post(roles::role_post), state, &["create_role"]))
        .route("/paginate", guarded(paged(get(roles::roles_get), rules), state, &["view_roles"]))
        .route("/by/users", get(roles::usage_get))
        .route("/by/count", get(roles::count_get))
        .route(
            "/by/:id",
            guarded(get(roles::role_get), state, &["view_roles"])
                .merge(guarded(patch(roles::role_patch), state, &["edit_role"]))
                .merge(guarded(axum::routing::delete(roles::role_delete), state, &["delete_role"])),
        )
        .route("/all", guarded(get(roles::all_get), state, &["view_roles"]))
}

fn permission_routes(state: &AppState) -> Router<AppState> {
    let rules = PERMISSION_SORT.with_config(&state.config.filter);

    Router::new()
        .route("/create", guarded(post(permissions::permission_post), state, &["create_permission"]))
        .route(
            "/paginate",
            guarded(paged(get(permissions::permissions_get), rules), state, &["view_permissions"]),
        )
        .route("/by/roles", get(permissions::usage_get))
        .route("/by/count", get(permissions::count_get))
        .route(
            "/by/:id",
            guarded(get(permissions::permission_get), state, &["view_permissions"])
                .merge(guarded(patch(permissions::permission_patch), state, &["edit_permission"]))
                .merge(guarded(axum::routing::delete(permissions::permission_delete), state, &["delete_permission"])),
        )
        .route("/all", guarded(get(permissions::all_get), state, &["view_permissions"]))
}

/// Agents and officers share handlers; the kind rides along as an extension.
fn profile_routes(state: &AppState, kind: ProfileKind, perms: &ProfilePerms) -> Router<AppState> {
    let rules = PROFILE_SORT.with_config(&state.config.filter);

    Router::new()
        .route("/create", guarded(post(profiles::profile_post), state, perms.create))
        .route("/paginate", guarded(paged(get(profiles::profiles_get), rules), state, perms.view))
        .route("/by/count", get(profiles::count_get))
        .route(
            "/by/:id",
            guarded(get(profiles::profile_get), state, perms.view).merge(guarded(patch(profiles::profile_patch), state, perms.edit)),
        )
        .route("/all", guarded(get(profiles::all_get), state, perms.view))
        .layer(Extension(kind))
}

fn member_routes(state: &AppState) -> Router<AppState> {
    let rules = PROFILE_SORT.with_config(&state.config.filter);

    Router::new()
        .route("/create", guarded(post(members::member_post), state, &["create_member"]))
        .route("/paginate/:id", guarded(paged(get(members::members_get), rules), state, &["view_members"]))
}

fn group_routes(state: &AppState) -> Router<AppState> {
    let rules = GROUP_SORT.with_config(&state.config.filter);

    Router::new()
        .route("/create", guarded(post(groups::group_post), state, &["create_group"]))
        .route("/paginate", guarded(paged(get(groups::groups_get), rules.clone()), state, &["view_groups"]))
        .route("/paginate/my", guarded(paged(get(groups::my_groups_get), rules), state, &[]))
        .route("/by/count", get(groups::count_get))
        .route(
            "/by/:id",
            guarded(get(groups::group_get), state, &["view_groups"]).merge(guarded(patch(groups::group_patch), state, &["edit_group"])),
        )
}

fn loan_routes(state: &AppState) -> Router<AppState> {
    let rules = LOAN_SORT.with_config(&state.config.filter);

    Router::new()
        .route("/create", guarded(post(loans::loan_post), state, &["create_loan"]))
        .route("/paginate", guarded(paged(get(loans::pending_get), rules.clone()), state, &["view_loans"]))
        .route(
            "/paginate/:group_id/:member_id",
            guarded(paged(get(loans::member_loans_get), rules), state, &["view_loans"]),
        )
        .route("/by/:id", guarded(get(loans::loan_get), state, &["view_loans"]))
        .route("/by/approve/:id", guarded(patch(loans::approve_patch), state, &["edit_loan"]))
        .route("/by/reject/:id", guarded(patch(loans::reject_patch), state, &["edit_loan"]))
}

fn media_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/new", guarded(post(media::upload_post), state, &["upload_media"]))
        .route("/remove", guarded(post(media::remove_post), state, &["delete_media"]))
}

/// Gateway webhooks are unauthenticated; only STK push needs a caller.
fn mpesa_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/b2c-result", post(mpesa::b2c_result_post))
        .route("/b2c-timeout", post(mpesa::b2c_timeout_post))
        .route("/stk-push", guarded(post(mpesa::stk_push_post), state, &["edit_loan"]))
        .route("/stk-callback", post(mpesa::stk_callback_post))
}

fn cors(config: &AppConfig) -> CorsLayer {
    if config.environment == Environment::Development {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}
