//! CLI entry point for the course mirror tool.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use course_mirror::{
    DiskMaterializer, Materializer, MirrorConfig, MirrorStats, PageFetcher, ResourceResolver,
    SESSION_COOKIE_NAME, SessionContext, list_courses, login, mirror_course,
};
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(school = %args.school, "CLI arguments parsed");
    info!("Course mirror starting");

    let portal_base = match &args.portal_url {
        Some(value) => MirrorConfig::parse_base_url(value)?,
        None => MirrorConfig::portal_base_for_school(&args.school)?,
    };
    let resource_base = match &args.resource_url {
        Some(value) => MirrorConfig::parse_base_url(value)?,
        None => MirrorConfig::default_resource_base()?,
    };
    let config = Arc::new(MirrorConfig::new(
        portal_base,
        resource_base,
        args.output.clone(),
        !args.overwrite,
        usize::from(args.concurrency),
    )?);

    let fetcher = Arc::new(PageFetcher::new()?);

    // Authentication failure is the one fatal error class: everything after
    // this point degrades per course, per folder, or per file.
    let session = match (&args.session_id, &args.username, &args.password) {
        (Some(session_id), _, _) => {
            debug!("adopting pre-obtained portal session");
            SessionContext::with_portal_session(SESSION_COOKIE_NAME, session_id)
        }
        (None, Some(username), Some(password)) => {
            login(&fetcher, &config, username, password)
                .await
                .context("portal login failed")?
        }
        _ => bail!("either --session-id or both --username and --password are required"),
    };

    let courses = list_courses(&fetcher, &config, &session)
        .await
        .context("course listing failed")?;

    if courses.is_empty() {
        info!("No courses found for this account");
        return Ok(());
    }
    info!(courses = courses.len(), "course list retrieved");

    let materializer: Arc<dyn Materializer> = Arc::new(DiskMaterializer::new(config.skip_existing)?);
    let resolver = Arc::new(ResourceResolver::new(
        Arc::clone(&fetcher),
        Arc::clone(&config),
        materializer,
    ));

    let totals = MirrorStats::new();
    for course in &courses {
        let stats = mirror_course(
            Arc::clone(&fetcher),
            Arc::clone(&resolver),
            Arc::clone(&config),
            &session,
            course,
        )
        .await;

        if stats.failed() > 0 {
            warn!(
                course = %course.title,
                failed = stats.failed(),
                "course finished with failures"
            );
        }
        info!(
            course = %course.title,
            materialized = stats.materialized(),
            skipped = stats.skipped_existing(),
            unsupported = stats.unsupported(),
            failed = stats.failed(),
            "course finished"
        );
        totals.absorb(&stats);
    }

    info!(
        materialized = totals.materialized(),
        skipped = totals.skipped_existing(),
        unsupported = totals.unsupported(),
        failed = totals.failed(),
        total = totals.total(),
        "Mirror complete"
    );

    Ok(())
}
