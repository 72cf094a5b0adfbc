//! API root resource

use crate::domain::Envelope;
use crate::middleware::auth::SessionUser;
use serde_json::{json, Value};

const ROOT: &str = "api";

const AUTHENTICATION_HINT: &str =
    "'POST /auth' with userName and password to obtain a JSON Web Token; subsequent requests require Bearer auth";

fn resources() -> Value {
    json!({
        "auth": { "_uri": "/auth" },
        "session": { "_uri": "/session" },
        "users": { "_uri": "/users" },
    })
}

/// GET / - main resources by URI, plus the session user when logged in
pub async fn get_root(SessionUser(user): SessionUser) -> Envelope {
    let mut body = json!({
        "resources": resources(),
        "authentication": AUTHENTICATION_HINT,
    });

    if let (Some(user), Some(map)) = (user, body.as_object_mut()) {
        map.insert(
            "user".to_string(),
            json!({ "id": user.subject_id, "role": user.role.as_str() }),
        );
    }

    Envelope::new(ROOT, body)
}
