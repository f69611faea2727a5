use std::{net::SocketAddr, path::PathBuf};

use anyhow::{anyhow, Context};
use murmur_api::{Comment, Role, UserId};
use murmur_mock_server::MockServer;

#[derive(structopt::StructOpt)]
struct Opt {
    /// Address to listen on
    #[structopt(short, long, default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// JSON file with the comments to start with, as generated by generate-test-data
    #[structopt(long)]
    seed: Option<PathBuf>,

    #[structopt(long, default_value = "2")]
    max_depth: usize,

    /// Users to create, as `name:role` with role one of scholar or guide
    #[structopt(short, long = "user")]
    users: Vec<String>,
}

fn parse_user(u: &str) -> anyhow::Result<(UserId, Role)> {
    let (name, role) = u
        .split_once(':')
        .ok_or_else(|| anyhow!("user {u:?} is not of the form name:role"))?;
    let role = match role {
        "scholar" => Role::Scholar,
        "guide" => Role::Guide,
        _ => return Err(anyhow!("unknown role {role:?} for user {name:?}")),
    };
    Ok((UserId::new(name), role))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let opt = <Opt as structopt::StructOpt>::from_args();

    let server = MockServer::shared(opt.max_depth);
    if let Some(seed) = &opt.seed {
        let data = std::fs::read(seed).with_context(|| format!("reading seed file {seed:?}"))?;
        let comments: Vec<Comment> =
            serde_json::from_slice(&data).with_context(|| format!("parsing seed file {seed:?}"))?;
        tracing::info!(num = comments.len(), "seeding comments");
        server.lock().seed(comments);
    }
    for u in opt.users.iter() {
        let (id, role) = parse_user(u)?;
        let token = server.lock().add_user(id.clone(), role);
        tracing::info!(user = %id.0, ?role, "created user");
        println!("{}\t{}", id.0, token.0);
    }

    tracing::info!("listening on {}", opt.listen);
    axum::Server::bind(&opt.listen)
        .serve(murmur_mock_server::router(server).into_make_service())
        .await
        .context("serving axum webserver")
}
