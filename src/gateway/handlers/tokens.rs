use axum::{
    Json,
    extract::{Extension, RawQuery},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{instrument, warn};

use super::{Params, expect_params, param, parse_params};
use crate::gateway::{
    error::GatewayError,
    protocol::{Gateway, RequestTokenGrant, SessionTokenGrant},
};

const REQUEST_TOKEN_ACTION: &str = "requestToken";
const SESSION_TOKEN_ACTION: &str = "sessionToken";

#[utoipa::path(
    get,
    path = "/",
    params(
        ("action" = String, Query, description = "`requestToken` or `sessionToken`"),
        ("authUser" = Option<String>, Query, description = "Account name, with action=requestToken"),
        ("sessionID" = Option<String>, Query, description = "Session identifier, with action=requestToken"),
        ("requestToken" = Option<String>, Query, description = "Request token, with action=sessionToken"),
    ),
    responses(
        (status = 200, description = "RequestTokenGrant or SessionTokenGrant as JSON; rejections as a text/plain line", body = RequestTokenGrant),
    ),
    tag = "sessiongate"
)]
// axum handler for the requestToken and sessionToken actions
#[instrument(skip_all)]
pub async fn tokens(
    Extension(gateway): Extension<Arc<Gateway>>,
    RawQuery(query): RawQuery,
) -> Response {
    let params = match parse_params(query.unwrap_or_default().as_bytes()) {
        Ok(params) => params,
        Err(err) => return rejection("unknown", &err),
    };

    match param(&params, "action") {
        REQUEST_TOKEN_ACTION => match request_token(&gateway, &params).await {
            Ok(grant) => grant_response(Json(grant)),
            Err(err) => rejection(REQUEST_TOKEN_ACTION, &err),
        },
        SESSION_TOKEN_ACTION => match session_token(&gateway, &params).await {
            Ok(grant) => grant_response(Json(grant)),
            Err(err) => rejection(SESSION_TOKEN_ACTION, &err),
        },
        _ => rejection(
            "unknown",
            &GatewayError::malformed("The action specified is not correct"),
        ),
    }
}

async fn request_token(
    gateway: &Gateway,
    params: &Params,
) -> Result<RequestTokenGrant, GatewayError> {
    expect_params(params, &["action", "authUser", "sessionID"])?;
    gateway
        .issue_request_token(param(params, "authUser"), param(params, "sessionID"))
        .await
}

async fn session_token(
    gateway: &Gateway,
    params: &Params,
) -> Result<SessionTokenGrant, GatewayError> {
    expect_params(params, &["action", "requestToken"])?;
    gateway
        .issue_session_token(param(params, "requestToken"))
        .await
}

fn grant_response(body: impl IntoResponse) -> Response {
    (
        StatusCode::OK,
        [(CACHE_CONTROL, HeaderValue::from_static("no-store"))],
        body,
    )
        .into_response()
}

fn rejection(action: &str, err: &GatewayError) -> Response {
    warn!(action, kind = err.kind(), "Rejected token request: {err}");
    (
        StatusCode::OK,
        [(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        )],
        format!("{err}\n"),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use crate::gateway::{
        protocol::{
            Gateway,
            tests::{FakeOracle, current_user, test_config, test_proofs},
        },
        router,
        token::is_token,
    };
    use anyhow::Result;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header::CACHE_CONTROL, header::CONTENT_TYPE},
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

    async fn get(app: axum::Router, uri: &str) -> Result<(StatusCode, String, String)> {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty())?)
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

    #[tokio::test]
    async fn request_token_returns_json_grant() -> Result<()> {
        let (app, _) = app("alice")?;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/?action=requestToken&authUser=alice&sessionID=sess1")
                    .body(Body::empty())?,
            )
            .await?;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CACHE_CONTROL).map(|v| v.as_bytes()),
            Some(&b"no-store"[..])
        );
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let grant: Value = serde_json::from_slice(&body)?;
        assert!(is_token(grant["requestToken"].as_str().unwrap_or_default()));
        assert_eq!(grant["accessFile"].as_str().map(str::len), Some(128));
        Ok(())
    }

    #[tokio::test]
    async fn malformed_queries_are_plain_text() -> Result<()> {
        let cases = [
            ("/", "Incorrect number of parameters passed\n"),
            ("/?action=deleteEverything", "The action specified is not correct\n"),
            (
                "/?action=requestToken&authUser=alice",
                "Incorrect number of parameters passed\n",
            ),
            (
                "/?action=requestToken&authUser=alice&sessionID=sess1&extra=1",
                "Incorrect number of parameters passed\n",
            ),
            (
                "/?action=requestToken&authUser=alice&session=sess1",
                "Incorrect parameters for the request, they should be action, authUser, sessionID\n",
            ),
            (
                "/?action=requestToken&authUser=Alice&sessionID=sess1",
                "The authUser parameter is not valid\n",
            ),
            (
                "/?action=requestToken&authUser=alice&sessionID=bad%2Fid",
                "The sessionID parameter is not valid\n",
            ),
            (
                "/?action=sessionToken&requestToken=abc",
                "The requestToken parameter is not valid\n",
            ),
        ];

        for (uri, expected) in cases {
            let (app, _) = app("alice")?;
            let (status, content_type, body) = get(app, uri).await?;
            assert_eq!(status, StatusCode::OK, "{uri}");
            assert!(content_type.starts_with("text/plain"), "{uri}");
            assert_eq!(body, expected, "{uri}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn blank_session_id_skips_session_lookup() -> Result<()> {
        let oracle = Arc::new(FakeOracle::with_session("alice", "sess1"));
        let gateway = Arc::new(Gateway::new(test_config(), oracle.clone(), test_proofs()?));

        let (status, content_type, body) = get(
            router(gateway),
            "/?action=requestToken&authUser=alice&sessionID=",
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.starts_with("text/plain"));
        assert_eq!(body, "Incorrect number of parameters passed\n");
        assert_eq!(oracle.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_session_is_reported() -> Result<()> {
        let (app, _) = app("alice")?;
        let (_, _, body) = get(app, "/?action=requestToken&authUser=alice&sessionID=other").await?;
        assert_eq!(body, "The given session for the user does not exist\n");
        Ok(())
    }

    #[tokio::test]
    async fn unknown_request_token_is_not_echoed() -> Result<()> {
        let (app, _) = app("alice")?;
        let token = "x".repeat(256);
        let (_, _, body) = get(app, &format!("/?action=sessionToken&requestToken={token}")).await?;
        assert_eq!(body, "The requestToken parameter is not valid\n");
        assert!(!body.contains(&token));
        Ok(())
    }

    #[tokio::test]
    async fn session_token_after_proof() -> Result<()> {
        let Some(user) = current_user() else {
            return Ok(());
        };
        let (app, gateway) = app(&user)?;

        let (_, _, body) = get(
            app.clone(),
            &format!("/?action=requestToken&authUser={user}&sessionID=sess1"),
        )
        .await?;
        let grant: Value = serde_json::from_str(&body)?;
        let request_token = grant["requestToken"].as_str().unwrap_or_default();
        let access_file = grant["accessFile"].as_str().unwrap_or_default();
        std::fs::write(gateway.proofs().root().join(access_file), b"")?;

        let uri = format!("/?action=sessionToken&requestToken={request_token}");
        let (_, content_type, body) = get(app.clone(), &uri).await?;
        assert!(content_type.starts_with("application/json"));
        let session: Value = serde_json::from_str(&body)?;
        assert!(is_token(session["sessionToken"].as_str().unwrap_or_default()));

        let (_, _, replay) = get(app, &uri).await?;
        assert_eq!(replay, "The requestToken parameter is not valid\n");
        Ok(())
    }
}
