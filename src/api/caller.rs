use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use ulid::Ulid;

use super::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Professional,
}

/// Identity asserted by the upstream auth proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub id: Ulid,
    pub role: Role,
}

impl Caller {
    /// For professionals the caller id is their professional profile id.
    pub fn require_professional(self) -> Result<Ulid, ApiError> {
        match self.role {
            Role::Professional => Ok(self.id),
            Role::Client => Err(ApiError::Forbidden(
                "this endpoint is for professionals".into(),
            )),
        }
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ApiError> {
    parts
        .headers
        .get(name)
        .ok_or_else(|| ApiError::Unauthorized(format!("missing {name} header")))?
        .to_str()
        .map_err(|_| ApiError::Unauthorized(format!("unreadable {name} header")))
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = Ulid::from_string(header(parts, USER_ID_HEADER)?.trim())
            .map_err(|_| ApiError::Unauthorized(format!("malformed {USER_ID_HEADER} header")))?;
        let role = match header(parts, USER_ROLE_HEADER)?.trim() {
            r if r.eq_ignore_ascii_case("client") => Role::Client,
            r if r.eq_ignore_ascii_case("professional") => Role::Professional,
            other => {
                return Err(ApiError::Unauthorized(format!("unknown role: {other}")));
            }
        };
        Ok(Caller { id, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(headers: &[(&str, &str)]) -> Result<Caller, ApiError> {
        let mut builder = Request::builder().uri("/appointments");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        Caller::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_id_and_role() {
        let id = Ulid::new();
        let id_str = id.to_string();
        let caller = extract(&[("X-User-Id", id_str.as_str()), ("X-User-Role", "Professional")])
            .await
            .unwrap();
        assert_eq!(caller, Caller { id, role: Role::Professional });
        assert_eq!(caller.require_professional().unwrap(), id);
    }

    #[tokio::test]
    async fn missing_or_malformed_identity_is_unauthorized() {
        assert!(matches!(extract(&[]).await, Err(ApiError::Unauthorized(_))));
        assert!(matches!(
            extract(&[("X-User-Id", "not-a-ulid"), ("X-User-Role", "client")]).await,
            Err(ApiError::Unauthorized(_))
        ));
        let id = Ulid::new().to_string();
        assert!(matches!(
            extract(&[("X-User-Id", id.as_str()), ("X-User-Role", "admin")]).await,
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn clients_are_not_professionals() {
        let id = Ulid::new().to_string();
        let caller = extract(&[("X-User-Id", id.as_str()), ("X-User-Role", "client")]).await.unwrap();
        assert!(matches!(caller.require_professional(), Err(ApiError::Forbidden(_))));
    }
}
