//! Allow-listed CORS headers for the single-page app.

use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::{Header, Status};
use rocket::{Request, Response};

pub struct Cors {
    allowed_origins: Vec<String>,
}

impl Cors {
    pub fn new(allowed_origins: Vec<String>) -> Self {
        Self { allowed_origins }
    }

    fn allows(&self, origin: &str) -> bool {
        let origin = origin.trim_end_matches('/');
        self.allowed_origins.iter().any(|o| o == "*" || o == origin)
    }
}

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "CORS allow-list",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, req: &'r Request<'_>, res: &mut Response<'r>) {
        let Some(origin) = req.headers().get_one("Origin") else {
            return;
        };
        if !self.allows(origin) {
            return;
        }

        res.set_header(Header::new("Access-Control-Allow-Origin", origin.to_string()));
        res.set_header(Header::new("Vary", "Origin"));
        res.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST, PUT, DELETE, OPTIONS",
        ));
        res.set_header(Header::new(
            "Access-Control-Allow-Headers",
            "Authorization, Content-Type",
        ));
    }
}

/// Answers every preflight request; the fairing adds the headers.
#[options("/<_..>")]
pub fn preflight() -> Status {
    Status::NoContent
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_listed_origins_only() {
        let cors = Cors::new(vec!["http://localhost:3000".into()]);
        assert!(cors.allows("http://localhost:3000"));
        assert!(cors.allows("http://localhost:3000/"));
        assert!(!cors.allows("https://evil.example"));
        assert!(Cors::new(vec!["*".into()]).allows("https://anything.example"));
    }
}
