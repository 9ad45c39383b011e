use anyhow::{Context, Result};
use contact_service::ContactForm;
use market_data_client::news::DEFAULT_ARTICLE_COUNT;
use market_data_client::{
    company_query, CompanyInfo, HistoryPeriod, MarketDataProvider, NewsArticle, NewsProvider,
    OhlcBar, StockSnapshot,
};
use std::sync::Arc;
use serde::Serialize;
use stockwatch_core::{FederatedCredential, Session, StoreKind, Ticker};
use watchlist_sync::{ReconcileOutcome, ReconcileReport, ReconcilerStatus, WatchlistView};

use crate::app::App;
use crate::cli::{Command, ContactArgs};

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", text());
    }
    Ok(())
}

#[derive(Serialize)]
struct LoginOutput {
    user_id: String,
    email: Option<String>,
    reconciliation: Option<ReconcileReport>,
}

#[derive(Serialize)]
struct TickersOutput {
    store: StoreKind,
    tickers: Vec<Ticker>,
}

#[derive(Serialize)]
struct StatusOutput {
    user_id: Option<String>,
    email: Option<String>,
    active_store: StoreKind,
    remote_backend: &'static str,
    reconciler: ReconcilerStatus,
}

#[derive(Debug, Serialize)]
struct HistoryOutput {
    ticker: Ticker,
    period: HistoryPeriod,
    company: Option<CompanyInfo>,
    snapshot: Option<StockSnapshot>,
    bars: Vec<OhlcBar>,
    news: Vec<NewsArticle>,
}

pub async fn run(app: &App, command: Command, json: bool) -> Result<()> {
    match command {
        Command::List => list(app, json).await,
        Command::Add { tickers } => {
            app.refresh_session().await;
            let mut added = Vec::new();
            for raw in &tickers {
                added.push(app.facade.add(raw).await?);
            }
            let output = TickersOutput {
                store: app.facade.active_store(),
                tickers: added,
            };
            emit(json, &output, || {
                format!("Added {} to the {} watchlist", join(&output.tickers), output.store)
            })
        }
        Command::Remove { tickers } => {
            app.refresh_session().await;
            let mut removed = Vec::new();
            for raw in &tickers {
                removed.push(app.facade.remove(raw).await?);
            }
            let output = TickersOutput {
                store: app.facade.active_store(),
                tickers: removed,
            };
            emit(json, &output, || {
                format!("Removed {} from the {} watchlist", join(&output.tickers), output.store)
            })
        }
        Command::Signup(creds) => {
            let result = app
                .sign_in_and_settle(app.auth.sign_up(&creds.email, &creds.password))
                .await?;
            login_output(json, "Signed up", result)
        }
        Command::Login(creds) => {
            let result = app
                .sign_in_and_settle(app.auth.sign_in(&creds.email, &creds.password))
                .await?;
            login_output(json, "Signed in", result)
        }
        Command::LoginFederated { provider, id_token } => {
            let credential = id_token.map(|id_token| FederatedCredential {
                provider_id: provider,
                id_token,
            });
            let result = app
                .sign_in_and_settle(app.auth.sign_in_with_federated(credential))
                .await?;
            login_output(json, "Signed in", result)
        }
        Command::Logout => {
            let user = app.sessions.current().map(|s| s.user_id);
            app.auth.sign_out().await?;
            emit(json, &serde_json::json!({ "signed_out": &user }), || match &user {
                Some(user_id) => format!("Signed out {}", user_id),
                None => "Not signed in".to_string(),
            })
        }
        Command::ResetPassword { email } => {
            app.auth.send_password_reset(&email).await?;
            emit(json, &serde_json::json!({ "sent": true }), || {
                format!("Password reset email sent to {}", email.trim())
            })
        }
        Command::Status => status(app, json).await,
        Command::History { ticker, period } => history(app, &ticker, period, json).await,
        Command::Contact(args) => contact(app, args, json).await,
    }
}

async fn list(app: &App, json: bool) -> Result<()> {
    app.refresh_session().await;
    let view: WatchlistView = app.facade.list_with_fallback().await?;
    if let Some(warning) = &view.warning {
        tracing::warn!("{}", warning);
    }

    emit(json, &view, || {
        let entries = view.watchlist.entries();
        if entries.is_empty() {
            return format!("The {} watchlist is empty", view.source);
        }
        let mut out = format!("{} watchlist ({} tickers)", view.source, entries.len());
        for entry in entries {
            out.push_str(&format!(
                "\n  {:<10} added {}",
                entry.ticker.as_str(),
                entry.added_at.format("%Y-%m-%d %H:%M")
            ));
        }
        out
    })
}

async fn status(app: &App, json: bool) -> Result<()> {
    app.refresh_session().await;
    let session = app.sessions.current();
    let output = StatusOutput {
        user_id: session.as_ref().map(|s| s.user_id.clone()),
        email: session.as_ref().and_then(|s| s.email.clone()),
        active_store: app.facade.active_store(),
        remote_backend: app.remote_backend,
        reconciler: app.reconciler.status().borrow().clone(),
    };

    emit(json, &output, || {
        let who = match (&output.user_id, &output.email) {
            (Some(_), Some(email)) => format!("Signed in as {}", email),
            (Some(user_id), None) => format!("Signed in as {}", user_id),
            _ => "Not signed in".to_string(),
        };
        format!(
            "{}\nActive store: {} (remote backend: {})",
            who, output.active_store, output.remote_backend
        )
    })
}

async fn history(app: &App, raw: &str, period: HistoryPeriod, json: bool) -> Result<()> {
    let market = app
        .market
        .as_ref()
        .context("Market data not configured (set MARKET_DATA_API_KEY)")?;
    let ticker = Ticker::parse(raw)?;
    let output = lookup(market, app.news.as_ref(), ticker, period).await?;

    emit(json, &output, || {
        let mut out = match &output.snapshot {
            Some(snapshot) => snapshot.to_string(),
            None => output.ticker.to_string(),
        };
        out.push_str(&format!(
            "\n{:<12}{:>10}{:>10}{:>10}{:>10}{:>14}",
            "DATE", "OPEN", "HIGH", "LOW", "CLOSE", "VOLUME"
        ));
        for bar in &output.bars {
            out.push_str(&format!(
                "\n{:<12}{:>10.2}{:>10.2}{:>10.2}{:>10.2}{:>14.0}",
                bar.timestamp.format("%Y-%m-%d").to_string(),
                bar.open,
                bar.high,
                bar.low,
                bar.close,
                bar.volume
            ));
        }
        if !output.news.is_empty() {
            out.push_str("\n\nLatest news");
            for article in &output.news {
                out.push_str(&format!("\n  {}", article.title));
                if let Some(source) = &article.source {
                    out.push_str(&format!(" ({})", source));
                }
                out.push_str(&format!("\n    {}", article.url));
            }
        }
        out
    })
}

/// Price history is required; company details and headlines are best effort.
async fn lookup(
    market: &Arc<dyn MarketDataProvider>,
    news: Option<&Arc<dyn NewsProvider>>,
    ticker: Ticker,
    period: HistoryPeriod,
) -> Result<HistoryOutput> {
    let bars = market.get_period_history(&ticker, period).await?;

    let company = match market.get_company_info(&ticker).await {
        Ok(info) => Some(info),
        Err(e) => {
            tracing::warn!(ticker = %ticker, "Company details unavailable: {}", e);
            None
        }
    };

    let headlines = match news {
        Some(news) => {
            let query = company_query(&ticker, company.as_ref());
            match news.headlines(&query, DEFAULT_ARTICLE_COUNT).await {
                Ok(articles) => articles,
                Err(e) => {
                    tracing::warn!(ticker = %ticker, "Headlines unavailable: {}", e);
                    Vec::new()
                }
            }
        }
        None => Vec::new(),
    };

    let snapshot = StockSnapshot::from_bars(ticker.clone(), &bars).map(|snapshot| {
        match &company {
            Some(info) => snapshot.with_company(info),
            None => snapshot,
        }
    });

    Ok(HistoryOutput {
        ticker,
        period,
        company,
        snapshot,
        bars,
        news: headlines,
    })
}

async fn contact(app: &App, args: ContactArgs, json: bool) -> Result<()> {
    let service = app
        .contact
        .as_ref()
        .context("Contact form not configured (set CONTACT_ACCESS_KEY)")?;
    let form = ContactForm {
        first_name: args.first_name,
        last_name: args.last_name,
        email: args.email,
        message: args.message,
    };

    let receipt = service.submit(&form).await?;
    emit(json, &receipt, || "Message sent successfully!".to_string())
}

fn login_output(
    json: bool,
    verb: &str,
    (session, report): (Session, Option<ReconcileReport>),
) -> Result<()> {
    let output = LoginOutput {
        user_id: session.user_id.clone(),
        email: session.email.clone(),
        reconciliation: report,
    };

    emit(json, &output, || {
        let who = output.email.as_deref().unwrap_or(&output.user_id);
        let sync = match output.reconciliation.as_ref().map(|r| (&r.outcome, r)) {
            Some((ReconcileOutcome::Merged, r)) => format!(
                "Moved {} local tickers into your account ({} new)",
                r.local_entries, r.merge.inserted
            ),
            Some((ReconcileOutcome::ClearFailed(reason), _)) => format!(
                "Local tickers copied to your account but could not be cleared: {}",
                reason
            ),
            Some((ReconcileOutcome::MergeFailed(reason), _)) => format!(
                "Could not sync local tickers, they stay on this device: {}",
                reason
            ),
            Some((ReconcileOutcome::NothingToMerge, _)) | None => {
                "No local tickers to sync".to_string()
            }
        };
        format!("{} as {}\n{}", verb, who, sync)
    })
}

fn join(tickers: &[Ticker]) -> String {
    tickers
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
