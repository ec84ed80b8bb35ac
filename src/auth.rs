//! Admin request guard.

use crate::config::AppConfig;
use crate::error::ApiError;
use log::warn;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};
use subtle::ConstantTimeEq;

/// Present on a request carrying `Authorization: Bearer <WEDDING_ADMIN_TOKEN>`.
///
/// Without a configured token every admin route is closed.
#[derive(Debug, Clone, Copy)]
pub struct Admin;

fn bearer_token<'a>(header: &'a str) -> Option<&'a str> {
    let (scheme, token) = header.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

/// Constant-time comparison; only the length can leak.
fn tokens_match(presented: &str, expected: &str) -> bool {
    if presented.len() != expected.len() {
        return false;
    }
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Admin {
    type Error = ApiError;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let expected = req
            .rocket()
            .state::<AppConfig>()
            .and_then(|c| c.admin_token.as_deref());
        let Some(expected) = expected else {
            return Outcome::Error((
                Status::Forbidden,
                ApiError::Forbidden("Admin access is not configured.".to_string()),
            ));
        };

        let presented = req.headers().get_one("Authorization").and_then(bearer_token);
        match presented {
            Some(token) if tokens_match(token, expected) => Outcome::Success(Admin),
            _ => {
                warn!("Rejected admin request to {}", req.uri());
                Outcome::Error((
                    Status::Forbidden,
                    ApiError::Forbidden("Invalid admin token.".to_string()),
                ))
            }
        }
    }
}
