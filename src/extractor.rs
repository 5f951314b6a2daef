use axum::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;

use crate::error::AppError;
use crate::identity::{Caller, Role};

#[derive(Deserialize)]
struct Claims {
    sub: i32,
    role: String,
    #[allow(dead_code)]
    exp: usize,
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let from_cookie = parts
        .headers
        .get(axum::http::header::COOKIE)
        .and_then(|header| header.to_str().ok())
        .and_then(|cookies| {
            cookies.split(';').find_map(|c| {
                let c = c.trim();
                c.strip_prefix("auth_token=").map(|s| s.to_string())
            })
        });
    from_cookie.or_else(|| {
        parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|authz| authz.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer ").map(|s| s.to_string()))
    })
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AppError::Unauthorized("missing token"))?;
        let secret = crate::config::JWT_SECRET.as_str();
        let decoded = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AppError::Unauthorized("invalid token"))?;
        let role =
            Role::parse(&decoded.claims.role).ok_or(AppError::Unauthorized("unknown role"))?;
        Ok(Caller::new(decoded.claims.sub, role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(role: &str) -> String {
        let claims = serde_json::json!({"sub": 7, "role": role, "exp": 9999999999u64});
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn token_parsed_from_header() {
        std::env::set_var("JWT_SECRET", "secret");
        let request = Request::builder()
            .header("Authorization", format!("Bearer {}", token("seller")))
            .body(axum::body::Body::empty())
            .unwrap();
        let mut parts = request.into_parts().0;
        let caller = Caller::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(caller, Caller::seller(7));
    }

    #[tokio::test]
    async fn header_used_when_cookie_lacks_token() {
        std::env::set_var("JWT_SECRET", "secret");
        let request = Request::builder()
            .header("Cookie", "theme=dark")
            .header("Authorization", format!("Bearer {}", token("admin")))
            .body(axum::body::Body::empty())
            .unwrap();
        let mut parts = request.into_parts().0;
        let caller = Caller::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(caller.is_admin());
    }

    #[tokio::test]
    async fn invalid_token_rejected() {
        std::env::set_var("JWT_SECRET", "secret");
        let request = Request::builder()
            .header("Authorization", "Bearer invalid")
            .body(axum::body::Body::empty())
            .unwrap();
        let mut parts = request.into_parts().0;
        let res = Caller::from_request_parts(&mut parts, &()).await;
        assert!(matches!(res, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn unknown_role_rejected() {
        std::env::set_var("JWT_SECRET", "secret");
        let request = Request::builder()
            .header("Cookie", format!("auth_token={}", token("superuser")))
            .body(axum::body::Body::empty())
            .unwrap();
        let mut parts = request.into_parts().0;
        let res = Caller::from_request_parts(&mut parts, &()).await;
        assert!(res.is_err());
    }
}
