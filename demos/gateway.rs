//! A gateway with the full chain and one authenticated route.
//!
//! Run with:
//!   LOG_LEVEL=trace WECHAT_APPID=wx123 WECHAT_SECRET=s3cret cargo run --example gateway
//!
//! Try:
//!   curl -i http://localhost:3000/ping
//!   curl -i -X OPTIONS http://localhost:3000/me
//!   curl -i -X POST http://localhost:3000/me -H 'Authorization: Bearer <js_code>' -d '{"nick":"a"}'
//!   curl -i http://localhost:3000/boom

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use gatehouse::config::IdentityProviderConfig;
use gatehouse::middleware::{AccessLog, Authenticate, Cors, Recover, TraceContext, UserLookup};
use gatehouse::{
    Config, Failure, Group, Method, Request, RequestContext, Response, Router, Server, User, logging,
};

const CODE2SESSION: &str = "https://api.weixin.qq.com/sns/jscode2session";

#[derive(Deserialize)]
struct Session {
    #[serde(default)]
    openid: String,
    #[serde(default)]
    unionid: String,
    #[serde(default)]
    errcode: i64,
}

/// Exchanges a mini-program login code for the user's open ids, and hands
/// out local numeric ids on first sight.
struct WechatUsers {
    client: reqwest::Client,
    provider: IdentityProviderConfig,
    known: Mutex<HashMap<String, u64>>,
    next_id: AtomicU64,
}

impl WechatUsers {
    fn new(provider: IdentityProviderConfig) -> Result<Self, gatehouse::Error> {
        Ok(Self {
            client: provider.http_client()?,
            provider,
            known: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }
}

#[async_trait]
impl UserLookup for WechatUsers {
    async fn get_user_token(&self, ctx: &RequestContext, token: &str) -> Result<User, Failure> {
        let session: Session = self
            .client
            .get(CODE2SESSION)
            .query(&[
                ("appid", self.provider.app_id.as_str()),
                ("secret", self.provider.secret.as_str()),
                ("js_code", token),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?
            .json()
            .await?;

        // A rejected code reads as an expired login.
        if session.errcode != 0 || session.openid.is_empty() {
            ctx.logger().warn("login code rejected", &session.errcode);
            return Ok(User::default());
        }

        let mut known = self.known.lock().await;
        let id = *known
            .entry(session.openid.clone())
            .or_insert_with(|| self.next_id.fetch_add(1, Ordering::Relaxed));

        Ok(User { id, primary_id: session.openid, secondary_id: session.unionid })
    }
}

#[tokio::main]
async fn main() -> Result<(), gatehouse::Error> {
    let config = Config::from_env()?;
    let _guard = logging::init(&config.log)?;

    let users = Arc::new(WechatUsers::new(config.identity_provider.clone())?);

    let app = Router::new()
        .layer(Recover::new())
        .layer(Cors::default())
        .layer(TraceContext::new())
        .layer(AccessLog::new(config.access_log.clone()))
        .on(Method::Get, "/ping", ping)
        .on(Method::Get, "/boom", boom)
        .group(Group::new().layer(Authenticate::new(users)).on(Method::Post, "/me", me));

    Server::bind(config.addr).serve(app).await
}

async fn ping(_req: Request) -> &'static str {
    "pong"
}

async fn boom(_req: Request) -> Response {
    let empty: Vec<u8> = Vec::new();
    Response::json(vec![empty[3]])
}

#[derive(Deserialize)]
struct Profile {
    nick: String,
}

async fn me(mut req: Request) -> Result<Response, Failure> {
    let profile: Profile = req.json().await?;
    let ctx = req.context();
    let user = ctx.identity().map(|u| u.id).unwrap_or_default();
    let body = serde_json::json!({
        "id": user,
        "openid": ctx.primary_id().unwrap_or_default(),
        "nick": profile.nick,
    });
    Ok(Response::json(serde_json::to_vec(&body)?))
}
