use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use futures::StreamExt;
use murmur_client::{
    api::{AuthToken, CommentId, ContentId, ContentType, NewComment, Reaction, Role, UserId, Uuid},
    Config, HttpService, Session, Viewer,
};

#[derive(structopt::StructOpt)]
struct Opt {
    #[structopt(short, long)]
    host: String,

    /// User id the token belongs to; without one, comments are read anonymously
    #[structopt(short, long)]
    user: Option<String>,

    /// Raw account roles of the user, eg. `scholar` or `guide`
    #[structopt(long = "role", default_value = "scholar")]
    roles: Vec<String>,

    /// JSON configuration file
    #[structopt(short, long)]
    config: Option<PathBuf>,

    #[structopt(subcommand)]
    cmd: Command,
}

fn parse_wire<T: serde::de::DeserializeOwned>(s: &str) -> anyhow::Result<T> {
    serde_json::from_value(serde_json::Value::String(String::from(s)))
        .with_context(|| format!("{s:?} is not a valid value"))
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Show the comments of a content
    List {
        content: String,

        /// Number of pages to load, all of them if unset
        #[structopt(short, long)]
        pages: Option<usize>,
    },

    /// Post a comment, or a reply with --parent
    Post {
        content: String,
        body: String,

        #[structopt(short, long)]
        parent: Option<String>,

        /// One of ideas_lab, guide_session, scholar_session
        #[structopt(short = "t", long, default_value = "ideas_lab", parse(try_from_str = parse_wire))]
        content_type: ContentType,

        /// Only visible to guides
        #[structopt(long)]
        annotation: bool,
    },

    Edit {
        content: String,
        id: String,
        body: String,
    },

    Delete {
        content: String,
        id: String,
    },

    React {
        content: String,
        id: String,

        /// One of like, love, insightful, question
        #[structopt(parse(try_from_str = parse_wire))]
        reaction: Reaction,
    },

    /// Count the comments of a content
    Stats { content: String },

    /// Keep refreshing a content and print notifications as they arrive
    Watch { content: String },
}

fn auth_token() -> anyhow::Result<AuthToken> {
    let tok =
        std::env::var("MURMUR_TOKEN").context("retrieving MURMUR_TOKEN environment variable")?;
    let tok = Uuid::try_parse(&tok).context("parsing MURMUR_TOKEN as an auth token")?;
    Ok(AuthToken(tok))
}

async fn load(
    session: &Session<HttpService>,
    content: &ContentId,
    pages: Option<usize>,
) -> anyhow::Result<()> {
    session
        .open(content)
        .await
        .with_context(|| format!("loading comments of {content}"))?;
    let mut loaded = 1;
    while session.fetcher.has_more(content) == Some(true) && pages.map_or(true, |p| loaded < p) {
        session
            .fetcher
            .fetch_next(content)
            .await
            .with_context(|| format!("loading more comments of {content}"))?;
        loaded += 1;
    }
    Ok(())
}

fn print_thread(session: &Session<HttpService>, content: &ContentId) {
    for v in session.visible_thread(content) {
        let c = &v.comment;
        let indent = "  ".repeat(c.depth);
        let mut flags = String::new();
        if c.moderator_only {
            flags.push_str(" [annotation]");
        }
        if c.edited_at.is_some() && !v.placeholder {
            flags.push_str(" [edited]");
        }
        println!(
            "{indent}{} {} ({}){flags}: {}",
            c.id,
            c.author_id.0,
            c.created_at.format("%Y-%m-%d %H:%M"),
            c.body
        );
        if !c.reactions.is_empty() {
            let reactions = c
                .reactions
                .iter()
                .map(|(r, n)| format!("{r:?} {n}"))
                .collect::<Vec<_>>()
                .join(", ");
            println!("{indent}  {reactions}");
        }
        if v.hidden_replies > 0 {
            println!("{indent}  ({} more replies, sign in to see them)", v.hidden_replies);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let opt = <Opt as structopt::StructOpt>::from_args();

    let config = match &opt.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let (viewer, token) = match &opt.user {
        None => (Viewer::anonymous(), None),
        Some(user) => (
            Viewer::new(UserId::new(user.clone()), Role::from_user_roles(&opt.roles)),
            Some(auth_token()?),
        ),
    };
    let service = Arc::new(HttpService::new(opt.host.clone(), token));
    let session = Session::new(service, viewer, config);

    match opt.cmd {
        Command::List { content, pages } => {
            let content = ContentId::new(content);
            load(&session, &content, pages).await?;
            print_thread(&session, &content);
        }
        Command::Post {
            content,
            body,
            parent,
            content_type,
            annotation,
        } => {
            let content = ContentId::new(content);
            load(&session, &content, None).await?;
            let c = session
                .coordinator
                .submit(NewComment {
                    content_id: content,
                    content_type,
                    parent_id: parent.map(CommentId::new),
                    body,
                    moderator_only: annotation,
                })
                .await
                .context("posting comment")?;
            println!("{}", c.id);
        }
        Command::Edit { content, id, body } => {
            load(&session, &ContentId::new(content), None).await?;
            session
                .coordinator
                .edit(&CommentId::new(id.clone()), body)
                .await
                .with_context(|| format!("editing comment {id}"))?;
        }
        Command::Delete { content, id } => {
            load(&session, &ContentId::new(content), None).await?;
            session
                .coordinator
                .delete(&CommentId::new(id.clone()))
                .await
                .with_context(|| format!("deleting comment {id}"))?;
        }
        Command::React {
            content,
            id,
            reaction,
        } => {
            load(&session, &ContentId::new(content), None).await?;
            let c = session
                .coordinator
                .react(&CommentId::new(id.clone()), reaction)
                .await
                .with_context(|| format!("reacting to comment {id}"))?;
            println!("{}", c.reaction_count());
        }
        Command::Stats { content } => {
            let content = ContentId::new(content);
            load(&session, &content, None).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&session.stats(&content))
                    .context("serializing stats")?
            );
        }
        Command::Watch { content } => {
            let content = ContentId::new(content);
            session.notifications.watch_content(content.clone());
            let _dispatcher = session.start_notifications();
            let mut notifications = session.notifications.subscribe();
            load(&session, &content, None).await?;
            print_thread(&session, &content);
            let _refresh = session.spawn_auto_refresh(content.clone());
            let mut gc = tokio::time::interval(Duration::from_secs(60));
            loop {
                tokio::select! {
                    n = notifications.next() => match n {
                        None => break,
                        Some(n) => println!(
                            "{} {:?} on {}: comment {}",
                            n.timestamp.format("%H:%M:%S"),
                            n.kind,
                            n.content_id,
                            n.comment_id
                        ),
                    },
                    _ = gc.tick() => {
                        session.notifications.gc();
                    }
                }
            }
        }
    }

    Ok(())
}
