//! Shared state and the per-route authentication gate.
//!
//! A gate is attached at route registration with the [`Access`] level the
//! route requires:
//!
//! ```rust,ignore
//! .route_layer(axum::middleware::from_fn_with_state(
//!     AuthGate::new(state.clone(), Access::Admin),
//!     authenticate,
//! ))
//! ```
//!
//! On success the resolved [`Identity`] is placed in request extensions and
//! handlers take it as an extractor.

use crate::auth::session::SessionRegistry;
use crate::auth::verify::{JwtCodec, TokenCodec};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::directory::{
    Argon2Hasher, CredentialHasher, OtpDelivery, OtpLedger, UnsentDelivery, UserDirectory,
    UserProfile,
};
use crate::error::AppError;
use crate::limiter::SlidingWindowLimiter;
use crate::lockout::{LockoutKind, LockoutTracker};
use crate::storage::SharedStore;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub clock: Arc<dyn Clock>,
    pub limiter: SlidingWindowLimiter,
    pub sessions: SessionRegistry,
    pub login_lockout: LockoutTracker,
    pub otp_lockout: LockoutTracker,
    pub tokens: Arc<dyn TokenCodec>,
    pub users: Arc<dyn UserDirectory>,
    pub otps: Arc<dyn OtpLedger>,
    pub delivery: Arc<dyn OtpDelivery>,
    pub hasher: Arc<dyn CredentialHasher>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire every component to one store handle.
    pub fn new(
        config: Config,
        store: SharedStore,
        users: Arc<dyn UserDirectory>,
        otps: Arc<dyn OtpLedger>,
    ) -> Self {
        let tokens = Arc::new(JwtCodec::new(
            config.jwt_secret.as_bytes(),
            config.jwt_ttl_secs,
        ));
        Self {
            limiter: SlidingWindowLimiter::new(store.clone()),
            sessions: SessionRegistry::new(store.clone(), config.session_ttl_secs),
            login_lockout: LockoutTracker::new(
                store.clone(),
                LockoutKind::Login,
                config.login_lockout,
            ),
            otp_lockout: LockoutTracker::new(store.clone(), LockoutKind::Otp, config.otp_lockout),
            store,
            clock: Arc::new(SystemClock),
            tokens,
            users,
            otps,
            delivery: Arc::new(UnsentDelivery),
            hasher: Arc::new(Argon2Hasher::default()),
            config: Arc::new(config),
        }
    }

    /// Replace the clock used for limiter windows and passcode expiry.
    ///
    /// Store TTLs follow the store's own clock; pass the same one to
    /// `MemoryStore::with_clock` to drive both from a test.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.limiter = SlidingWindowLimiter::with_clock(self.store.clone(), clock.clone());
        self.clock = clock;
        self
    }

    /// Route issued passcodes through `delivery`.
    pub fn with_delivery(mut self, delivery: Arc<dyn OtpDelivery>) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn CredentialHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Current wall-clock time in whole seconds.
    pub fn now_secs(&self) -> u64 {
        (self.clock.now_millis().max(0) / 1000) as u64
    }
}

/// Role a route requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Any authenticated user.
    User,
    /// Authenticated user with the admin flag.
    Admin,
}

/// State for one gate instance.
#[derive(Clone)]
pub struct AuthGate {
    pub state: AppState,
    pub access: Access,
}

impl AuthGate {
    pub fn new(state: AppState, access: Access) -> Self {
        Self { state, access }
    }
}

/// Authenticated caller, attached to request extensions by [`authenticate`].
#[derive(Debug, Clone)]
pub struct Identity {
    pub user: UserProfile,
    pub session_id: String,
}

/// Gate middleware: token → session → user record → role.
///
/// Every failure before the role check answers with the same 401 body; the
/// role check alone answers 403.
pub async fn authenticate(
    State(gate): State<AuthGate>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = resolve_identity(&gate.state, request.headers()).await?;

    if gate.access == Access::Admin && !identity.user.is_admin {
        tracing::warn!(action = "forbidden", user_id = %identity.user.id, "Admin access required");
        return Err(AppError::Forbidden);
    }

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Extract the bearer token from the Authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve the caller from request headers.
pub async fn resolve_identity(state: &AppState, headers: &HeaderMap) -> Result<Identity, AppError> {
    let token = bearer_token(headers).ok_or_else(AppError::unauthenticated)?;

    let claims = state.tokens.verify(token).map_err(|e| {
        tracing::debug!(error = %e, "Bearer token rejected");
        AppError::unauthenticated()
    })?;

    // Store errors deny: an unverifiable session is not a live one.
    let live = state.sessions.verify(&claims.session_id).await.map_err(|e| {
        tracing::warn!(error = %e, "Session lookup failed, denying request");
        AppError::unauthenticated()
    })?;
    if !live {
        tracing::debug!("Session absent or expired");
        return Err(AppError::unauthenticated());
    }

    let user = state
        .users
        .find_by_email_and_matric(&claims.email, claims.matric_no)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "User lookup failed, denying request");
            AppError::unauthenticated()
        })?
        .ok_or_else(|| {
            tracing::debug!("Token claims no longer match a user record");
            AppError::unauthenticated()
        })?;

    Ok(Identity {
        user: UserProfile::from(&user),
        session_id: claims.session_id,
    })
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(AppError::unauthenticated)
    }
}
