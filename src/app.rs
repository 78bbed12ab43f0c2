use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;

use crate::api;
use crate::config;
use crate::data::{HttpAuthService, HttpProfileService, HttpStationService};
use crate::profile::{self, NullNavigator, Status};
use crate::search;
use crate::session;
use crate::textfmt;

pub fn run(args: &[String]) -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    let client = Arc::new(api::Client::new(api::ClientConfig {
        base_url: Some(cfg.api.base_url.clone()),
        user_agent: cfg.api.user_agent.clone(),
        timeout: Some(cfg.api.timeout),
        http_client: None,
    })?);

    match args.first().map(String::as_str) {
        Some("stations") => {
            let query = args.get(1).map(String::as_str).unwrap_or("");
            if query.trim().is_empty() {
                bail!("usage: railclub stations <query>");
            }
            let engine = search::Engine::new(
                Arc::new(HttpStationService::new(client.clone())),
                search::Options::from(&cfg.search),
            );
            let stations = engine.search_now(query);
            if stations.is_empty() {
                println!("Станции не найдены.");
            }
            for station in stations {
                println!("{:>9}  {}", station.code, station.station);
            }
        }
        Some("routes") => {
            let (from, to) = two_codes(args)?;
            let routes = client.routes(from, to)?;
            println!("{} — {}", routes.info.origin, routes.info.destination);
            for train in routes.trains {
                let marker = if train.is_express { "*" } else { " " };
                println!(
                    "{marker} {:<6} {:<30} {} -> {}",
                    train.number, train.route, train.ts_dep, train.ts_arr
                );
            }
        }
        Some("stops") => {
            let train = args
                .get(1)
                .context("usage: railclub stops <train> <code_from> <code_to>")?;
            let from = args
                .get(2)
                .context("usage: railclub stops <train> <code_from> <code_to>")?;
            let to = args
                .get(3)
                .context("usage: railclub stops <train> <code_from> <code_to>")?;
            let stops = client.station_list(train, from, to)?;
            println!("Поезд {}", stops.train);
            for stop in stops.stops {
                let marker = if stop.is_target { ">" } else { " " };
                println!(
                    "{marker} {:<24} {} -> {} ({} мин)",
                    stop.name, stop.ts_arr, stop.ts_dep, stop.stop_min
                );
            }
        }
        Some("profile") => {
            show_profile(client, args.get(1).map(String::as_str))?;
        }
        Some("login") | Some("register") => {
            let command = args[0].as_str();
            let username = args
                .get(1)
                .with_context(|| format!("usage: railclub {command} <username> <password>"))?;
            let password = args
                .get(2)
                .with_context(|| format!("usage: railclub {command} <username> <password>"))?;
            let result = if command == "login" {
                client.login(username, password)
            } else {
                client.register(username, password)
            };
            match result {
                Ok(()) => println!("Добро пожаловать, {username}!"),
                Err(api::ApiError::Validation { code, .. }) => {
                    let message = match code.as_str() {
                        "WR" => "Неверный логин или пароль.",
                        "AL" => "Такой ник уже занят.",
                        "TM" => "Слишком много аккаунтов с этого адреса.",
                        other => other,
                    };
                    bail!("{message}");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Some("whoami") => {
            let session = session::Manager::new(Arc::new(HttpAuthService::new(client)));
            session.refresh();
            match session.identity() {
                Some(identity) => println!("{} ({})", identity.nickname, identity.username),
                None => println!("Вы не вошли в аккаунт."),
            }
        }
        Some(other) => bail!("unknown command: {other}"),
        None => bail!("usage: railclub <stations|routes|stops|profile|login|register|whoami> ..."),
    }

    Ok(())
}

fn two_codes(args: &[String]) -> Result<(&str, &str)> {
    let from = args
        .get(1)
        .context("usage: railclub routes <code_from> <code_to>")?;
    let to = args
        .get(2)
        .context("usage: railclub routes <code_from> <code_to>")?;
    Ok((from, to))
}

fn show_profile(client: Arc<api::Client>, who: Option<&str>) -> Result<()> {
    let session = session::Manager::new(Arc::new(HttpAuthService::new(client.clone())));
    let controller = profile::Controller::new(
        Arc::new(HttpProfileService::new(client.clone())),
        session,
        Arc::new(NullNavigator),
    );
    controller.set_target(who);

    match controller.load() {
        Status::Loaded => {}
        status => {
            let message = status
                .message()
                .unwrap_or("Войдите в аккаунт, чтобы посмотреть свой профиль.");
            println!("{message}");
            return Ok(());
        }
    }

    let user = controller.user().context("profile loaded without a user")?;
    println!("{} (@{})", user.nickname, user.username);
    if let Some(role) = &user.role {
        println!("роль: {role}");
    }
    if let Some(description) = &user.description {
        if !description.is_empty() {
            println!("{description}");
        }
    }
    println!(
        "репутация: +{} / -{}",
        user.reputation.likes, user.reputation.dislikes
    );
    if controller.is_owner() {
        println!("(это ваш профиль)");
    } else if let Ok(link) = client.profile_url(&user.username) {
        println!("{link}");
    }

    if !user.comments.is_empty() {
        println!("\nКомментарии:");
        let now_ms = Utc::now().timestamp_millis();
        for comment in &user.comments {
            let sender = comment
                .sender
                .as_ref()
                .map(|s| s.nickname.as_str())
                .unwrap_or("аноним");
            println!(
                "  {} — {} ({})",
                sender,
                comment.body,
                textfmt::rel_time(&comment.timestamp, now_ms)
            );
        }
    }

    Ok(())
}
