//! Caller identity extractor
//!
//! Authentication happens upstream; the gateway forwards the verified
//! identity as headers and this service trusts them.

use axum::{extract::FromRequestParts, http::request::Parts};
use shared::order::ActorRole;

use crate::security_log;
use shared::AppError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const RESTAURANT_ID_HEADER: &str = "x-restaurant-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Authenticated caller of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentActor {
    pub actor_id: String,
    pub restaurant_id: String,
    pub role: ActorRole,
}

impl CurrentActor {
    /// Reject callers whose role is not in `allowed`
    pub fn require_role(&self, allowed: &[ActorRole]) -> Result<(), AppError> {
        if allowed.contains(&self.role) {
            return Ok(());
        }
        security_log!(
            "WARN",
            "role_denied",
            actor_id = self.actor_id.as_str(),
            role = self.role.as_str()
        );
        Err(AppError::permission_denied(format!(
            "Role {} may not perform this operation",
            self.role.as_str()
        ))
        .with_detail("role", self.role.as_str()))
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentActor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(actor) = parts.extensions.get::<CurrentActor>() {
            return Ok(actor.clone());
        }

        let (Some(actor_id), Some(restaurant_id)) = (
            header(parts, ACTOR_ID_HEADER),
            header(parts, RESTAURANT_ID_HEADER),
        ) else {
            security_log!("WARN", "identity_missing", uri = format!("{:?}", parts.uri));
            return Err(AppError::not_authenticated());
        };

        let role = match header(parts, ACTOR_ROLE_HEADER) {
            Some(raw) => raw.parse::<ActorRole>()?,
            None => ActorRole::Waiter,
        };

        let actor = CurrentActor {
            actor_id: actor_id.to_string(),
            restaurant_id: restaurant_id.to_string(),
            role,
        };
        parts.extensions.insert(actor.clone());
        Ok(actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Request;

    async fn extract(req: Request<()>) -> Result<CurrentActor, AppError> {
        let (mut parts, _) = req.into_parts();
        CurrentActor::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_identity_headers() {
        let req = Request::builder()
            .header(ACTOR_ID_HEADER, "mgr-1")
            .header(RESTAURANT_ID_HEADER, "r-1")
            .header(ACTOR_ROLE_HEADER, "Manager")
            .body(())
            .unwrap();

        let actor = extract(req).await.unwrap();
        assert_eq!(actor.actor_id, "mgr-1");
        assert_eq!(actor.restaurant_id, "r-1");
        assert_eq!(actor.role, ActorRole::Manager);
        assert!(actor.require_role(&[ActorRole::Manager]).is_ok());
    }

    #[tokio::test]
    async fn role_defaults_to_waiter() {
        let req = Request::builder()
            .header(ACTOR_ID_HEADER, "w-1")
            .header(RESTAURANT_ID_HEADER, "r-1")
            .body(())
            .unwrap();

        let actor = extract(req).await.unwrap();
        assert_eq!(actor.role, ActorRole::Waiter);
        let err = actor.require_role(&[ActorRole::Manager]).unwrap_err();
        assert_eq!(err.code, shared::ErrorCode::PermissionDenied);
    }

    #[tokio::test]
    async fn missing_restaurant_is_unauthenticated() {
        let req = Request::builder()
            .header(ACTOR_ID_HEADER, "w-1")
            .body(())
            .unwrap();

        let err = extract(req).await.unwrap_err();
        assert_eq!(err.code, shared::ErrorCode::NotAuthenticated);
    }

    #[tokio::test]
    async fn unknown_role_is_rejected() {
        let req = Request::builder()
            .header(ACTOR_ID_HEADER, "w-1")
            .header(RESTAURANT_ID_HEADER, "r-1")
            .header(ACTOR_ROLE_HEADER, "owner")
            .body(())
            .unwrap();

        let err = extract(req).await.unwrap_err();
        assert_eq!(err.code, shared::ErrorCode::InvalidRequest);
    }
}
