use axum::{
    body::Bytes,
    extract::Extension,
    http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{instrument, warn};

use super::{expect_params, param, parse_params, xml_escape};
use crate::gateway::{error::GatewayError, protocol::Gateway};

#[utoipa::path(
    post,
    path = "/",
    request_body(
        content = String,
        content_type = "application/x-www-form-urlencoded",
        description = "authenticationToken=<session token>&sessionId=<session id>"
    ),
    responses(
        (status = 200, description = "XML verdict: <auth result=\"yes\"> with the username, or <auth result=\"no\"> with a message", body = String, content_type = "text/xml"),
    ),
    tag = "sessiongate"
)]
// axum handler used by the session server to validate a session token
#[instrument(skip_all)]
pub async fn auth(Extension(gateway): Extension<Arc<Gateway>>, body: Bytes) -> Response {
    let verdict = match validate(&gateway, &body).await {
        Ok(user) => format!(
            "<auth result=\"yes\"><username>{}</username></auth>",
            xml_escape(&user)
        ),
        Err(err) => {
            warn!(kind = err.kind(), "Rejected session token: {err}");
            format!(
                "<auth result=\"no\"><message>{}</message></auth>",
                xml_escape(&err.to_string())
            )
        }
    };

    (
        StatusCode::OK,
        [(CONTENT_TYPE, HeaderValue::from_static("text/xml"))],
        verdict,
    )
        .into_response()
}

async fn validate(gateway: &Gateway, body: &[u8]) -> Result<String, GatewayError> {
    let params = parse_params(body)?;
    expect_params(&params, &["authenticationToken", "sessionId"])?;
    gateway
        .validate_session_token(
            param(&params, "sessionId"),
            param(&params, "authenticationToken"),
        )
        .await
}

#[cfg(test)]
mod tests {
    use crate::gateway::{
        protocol::{
            Gateway,
            tests::{FakeOracle, current_user, test_config, test_proofs},
        },
        router,
    };
    use anyhow::Result;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode, header::CONTENT_TYPE},
    };
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(user: &str) -> Result<(axum::Router, Arc<Gateway>)> {
        let gateway = Arc::new(Gateway::new(
            test_config(),
            Arc::new(FakeOracle::with_session(user, "sess1")),
            test_proofs()?,
        ));
        Ok((router(gateway.clone()), gateway))
    }

    async fn post(app: axum::Router, form: String) -> Result<(StatusCode, String, String)> {
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/")
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(form))?,
            )
            .await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, content_type, String::from_utf8(body.to_vec())?))
    }

    async fn get_json(app: axum::Router, uri: &str) -> Result<Value> {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty())?)
            .await?;
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    #[tokio::test]
    async fn malformed_posts_answer_with_negative_xml() -> Result<()> {
        let token = "a".repeat(256);
        let cases = [
            (String::new(), "Incorrect number of parameters passed"),
            (
                format!("authenticationToken={token}"),
                "Incorrect number of parameters passed",
            ),
            (
                format!("authenticationToken={token}&sessionId=sess1&extra=1"),
                "Incorrect number of parameters passed",
            ),
            (
                format!("authenticationToken={token}&session=sess1"),
                "Incorrect parameters for the request, they should be authenticationToken, sessionId",
            ),
            (
                "authenticationToken=short&sessionId=sess1".to_string(),
                "The authenticationToken parameter is not valid",
            ),
            (
                format!("authenticationToken={token}&sessionId=sess1"),
                "The session token is not valid",
            ),
        ];

        for (form, message) in cases {
            let (app, _) = app("alice")?;
            let (status, content_type, body) = post(app, form).await?;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(content_type, "text/xml");
            assert_eq!(
                body,
                format!("<auth result=\"no\"><message>{message}</message></auth>")
            );
            assert!(!body.contains(&token));
        }
        Ok(())
    }

    #[tokio::test]
    async fn full_handshake_yields_positive_xml_once() -> Result<()> {
        let Some(user) = current_user() else {
            return Ok(());
        };
        let (app, gateway) = app(&user)?;

        let grant = get_json(
            app.clone(),
            &format!("/?action=requestToken&authUser={user}&sessionID=sess1"),
        )
        .await?;
        let access_file = grant["accessFile"].as_str().unwrap_or_default();
        std::fs::write(gateway.proofs().root().join(access_file), b"")?;

        let session = get_json(
            app.clone(),
            &format!(
                "/?action=sessionToken&requestToken={}",
                grant["requestToken"].as_str().unwrap_or_default()
            ),
        )
        .await?;
        let session_token = session["sessionToken"].as_str().unwrap_or_default();

        // Wrong session burns the token.
        let (_, _, body) = post(
            app.clone(),
            format!("authenticationToken={session_token}&sessionId=sess2"),
        )
        .await?;
        assert!(body.starts_with("<auth result=\"no\">"));

        let (_, _, body) = post(
            app,
            format!("authenticationToken={session_token}&sessionId=sess1"),
        )
        .await?;
        assert_eq!(
            body,
            "<auth result=\"no\"><message>The session token is not valid</message></auth>"
        );
        Ok(())
    }

    #[tokio::test]
    async fn blank_session_id_keeps_session_token() -> Result<()> {
        let Some(user) = current_user() else {
            return Ok(());
        };
        let (app, gateway) = app(&user)?;

        let grant = get_json(
            app.clone(),
            &format!("/?action=requestToken&authUser={user}&sessionID=sess1"),
        )
        .await?;
        let access_file = grant["accessFile"].as_str().unwrap_or_default();
        std::fs::write(gateway.proofs().root().join(access_file), b"")?;
        let session = get_json(
            app.clone(),
            &format!(
                "/?action=sessionToken&requestToken={}",
                grant["requestToken"].as_str().unwrap_or_default()
            ),
        )
        .await?;
        let session_token = session["sessionToken"].as_str().unwrap_or_default();

        let (_, _, body) = post(
            app.clone(),
            format!("authenticationToken={session_token}&sessionId="),
        )
        .await?;
        assert_eq!(
            body,
            "<auth result=\"no\"><message>Incorrect number of parameters passed</message></auth>"
        );

        let (_, _, body) = post(
            app,
            format!("authenticationToken={session_token}&sessionId=sess1"),
        )
        .await?;
        assert_eq!(
            body,
            format!("<auth result=\"yes\"><username>{user}</username></auth>")
        );
        Ok(())
    }

    #[tokio::test]
    async fn valid_session_token_returns_username() -> Result<()> {
        let Some(user) = current_user() else {
            return Ok(());
        };
        let (app, gateway) = app(&user)?;

        let grant = get_json(
            app.clone(),
            &format!("/?action=requestToken&authUser={user}&sessionID=sess1"),
        )
        .await?;
        let access_file = grant["accessFile"].as_str().unwrap_or_default();
        std::fs::write(gateway.proofs().root().join(access_file), b"")?;
        let session = get_json(
            app.clone(),
            &format!(
                "/?action=sessionToken&requestToken={}",
                grant["requestToken"].as_str().unwrap_or_default()
            ),
        )
        .await?;
        let session_token = session["sessionToken"].as_str().unwrap_or_default();

        let (_, _, body) = post(
            app,
            format!("sessionId=sess1&authenticationToken={session_token}"),
        )
        .await?;
        assert_eq!(
            body,
            format!("<auth result=\"yes\"><username>{user}</username></auth>")
        );
        Ok(())
    }
}
