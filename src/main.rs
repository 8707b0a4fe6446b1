use std::{fs, process, sync::Arc};

use postdesk::{
    application::{
        admin::{
            AdminContext,
            posts::{NextPage, PostForm, ViewError},
        },
        error::AppError,
        gateway::PostsGateway,
    },
    cache::{CacheConfig, QueryKey},
    config::{self, EditArgs, ListArgs, RenameArgs, ShowArgs},
    infra::{http::HttpPostsGateway, telemetry},
};
use serde::Serialize;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    let detail = report.messages.join(": ");

    if dispatcher::has_been_set() {
        error!(source = report.source, error = %detail, "{}", error.presentation_message());
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(source = report.source, error = %detail, "{}", error.presentation_message());
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    let gateway = HttpPostsGateway::new(&settings.api)?;
    info!(
        base_url = %gateway.base_url(),
        user_agent = HttpPostsGateway::user_agent(),
        "Posts gateway ready"
    );
    let gateway: Arc<dyn PostsGateway> = Arc::new(gateway);
    let context = AdminContext::new(gateway, CacheConfig::from(&settings.cache));

    let result = match cli_args.command {
        config::Command::List(args) => run_list(&context, args).await,
        config::Command::Show(args) => run_show(&context, args).await,
        config::Command::Rename(args) => run_rename(&context, args).await,
        config::Command::Edit(args) => run_edit(&context, args).await,
    };

    context.shutdown();
    result
}

async fn run_list(context: &AdminContext, args: ListArgs) -> Result<(), AppError> {
    let view = context.posts_list();
    view.load().await?;

    for _ in 1..args.pages {
        match view.fetch_next_page().await? {
            NextPage::Loaded { pages } => info!(pages, "Loaded next page"),
            NextPage::Skipped => warn!("List fetch already running; page skipped"),
            NextPage::Discarded => break,
        }
    }

    if args.html {
        println!("{}", view.render()?);
    } else {
        let posts: Vec<_> = view.rows().into_iter().map(|row| row.post).collect();
        print_json(&posts)?;
    }
    view.unmount();
    Ok(())
}

async fn run_show(context: &AdminContext, args: ShowArgs) -> Result<(), AppError> {
    let view = context.post_edit(args.id);
    let post = view
        .load()
        .await?
        .applied()
        .ok_or_else(|| AppError::unexpected("post view closed before loading"))?;

    if args.html {
        println!("{}", view.render()?);
    } else {
        print_json(&post)?;
    }
    view.unmount();
    Ok(())
}

async fn run_rename(context: &AdminContext, args: RenameArgs) -> Result<(), AppError> {
    let title = args.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::validation("title must not be empty"));
    }

    let view = context.posts_list();
    view.load().await?;
    view.begin_edit(args.id);
    view.commit_title(args.id, title).await?;

    let row = view
        .rows()
        .into_iter()
        .find(|row| row.post.id == args.id);
    match row {
        Some(row) => print_json(&row.post)?,
        None => info!(post_id = args.id, "Renamed post is not on the loaded pages"),
    }
    view.unmount();
    Ok(())
}

async fn run_edit(context: &AdminContext, args: EditArgs) -> Result<(), AppError> {
    let view = context.post_edit(args.id);
    view.load().await?;
    let mut form = view.form().ok_or(ViewError::MissingData {
        key: QueryKey::Post(args.id),
    })?;

    apply_edit_args(&mut form, args)?;
    view.submit(form).await?;

    if let Some(flash) = view.flash() {
        println!("{}", flash.text);
    }
    view.unmount();
    Ok(())
}

fn apply_edit_args(form: &mut PostForm, args: EditArgs) -> Result<(), AppError> {
    if let Some(title) = args.title {
        form.title = title;
    }
    if let Some(content) = args.content {
        form.content = content;
    }
    if let Some(path) = args.content_file {
        form.content = fs::read_to_string(&path).map_err(|err| {
            AppError::validation(format!("failed to read {}: {err}", path.display()))
        })?;
    }
    if let Some(published) = args.published {
        form.published = published;
    }

    if form.title.trim().is_empty() {
        return Err(AppError::validation("title must not be empty"));
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to encode output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
