use actix_web::{dev::Payload, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use uuid::Uuid;

use crate::error::AppError;

/// Set by the upstream auth layer once the caller's token is verified
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Caller identity taken from `X-User-Id`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub Uuid);

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let result = req
            .headers()
            .get(USER_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing user identity".to_string()))
            .and_then(|raw| {
                Uuid::parse_str(raw.trim())
                    .map_err(|_| AppError::Unauthorized("invalid user identity".to_string()))
            })
            .map(AuthenticatedUser);
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[actix_web::test]
    async fn test_identity_from_header() {
        let id = Uuid::new_v4();
        let req = TestRequest::default()
            .insert_header((USER_ID_HEADER, id.to_string()))
            .to_http_request();
        let user = AuthenticatedUser::extract(&req).await.unwrap();
        assert_eq!(user.0, id);
    }

    #[actix_web::test]
    async fn test_missing_or_bad_identity_unauthorized() {
        let req = TestRequest::default().to_http_request();
        assert!(matches!(
            AuthenticatedUser::extract(&req).await,
            Err(AppError::Unauthorized(_))
        ));

        let req = TestRequest::default()
            .insert_header((USER_ID_HEADER, "nope"))
            .to_http_request();
        assert!(matches!(
            AuthenticatedUser::extract(&req).await,
            Err(AppError::Unauthorized(_))
        ));
    }
}
