//! Controller loop.
//!
//! The supervisory actor. Owns the controller section of the session
//! document and the day-level bookkeeping:
//! - session start (with the recovery-day veto) and manual end
//! - bias, news lock and checklist entered by the operator
//! - day rollover, which bumps the session epoch
//! - auto-shutdown when the enforcer signals a daily limit
//! - the trading terminal process around the daily break and shutdowns
//! - position sizing for the operator's planned risk

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::news::NewsCalendar;
use crate::process::ProcessController;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use guard_bridge::{PublishOutcome, ReadOutcome, SessionBridge, SessionStore};
use guard_core::{
    Bias, ControllerSection, DailyRecord, EnforcerSection, Lots, SessionState, Usd,
};
use guard_executor::SizingConfig;
use guard_persistence::DailyHistory;
use guard_rules::{schedule, TradingCalendar};
use guard_telemetry::OperatorAlert;
use rust_decimal::Decimal;
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

/// Result of a session start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// Two red days in a row: today is vetoed.
    RecoveryDay,
    /// The day was already shut down or ended; no restart until tomorrow.
    AlreadyEnded,
    AlreadyActive,
}

/// Operator command read from stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerCommand {
    Start,
    End,
    Bias {
        bias: Bias,
        invalidation: Option<Decimal>,
        strict: bool,
    },
    News(bool),
    Checklist(bool),
    /// Lots for a dollar risk over a stop distance in points.
    Size {
        risk: Usd,
        stop_distance: Decimal,
    },
    Status,
}

impl FromStr for ControllerCommand {
    type Err = AppError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(AppError::Command("empty command".to_string()));
        };
        let args: Vec<&str> = words.collect();

        match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("start", []) => Ok(Self::Start),
            ("end", []) => Ok(Self::End),
            ("status", []) => Ok(Self::Status),
            ("news", ["on"]) => Ok(Self::News(true)),
            ("news", ["off"]) => Ok(Self::News(false)),
            ("checklist", ["done"]) => Ok(Self::Checklist(true)),
            ("checklist", ["reset"]) => Ok(Self::Checklist(false)),
            ("size", [risk, stop]) => {
                let risk = Usd::from_str(risk)
                    .map_err(|e| AppError::Command(format!("invalid risk {risk}: {e}")))?;
                let stop_distance = Decimal::from_str(stop)
                    .map_err(|e| AppError::Command(format!("invalid stop distance {stop}: {e}")))?;
                Ok(Self::Size {
                    risk,
                    stop_distance,
                })
            }
            ("bias", [direction, rest @ ..]) => {
                let bias = Bias::from_str(direction).map_err(|e| AppError::Command(e.to_string()))?;
                let mut invalidation = None;
                let mut strict = false;
                for arg in rest {
                    if arg.eq_ignore_ascii_case("strict") {
                        strict = true;
                    } else {
                        let price = Decimal::from_str(arg).map_err(|e| {
                            AppError::Command(format!("invalid invalidation price {arg}: {e}"))
                        })?;
                        invalidation = Some(price);
                    }
                }
                Ok(Self::Bias {
                    bias,
                    invalidation,
                    strict,
                })
            }
            _ => Err(AppError::Command(format!("unknown command: {}", line.trim()))),
        }
    }
}

/// The controller actor.
pub struct Controller<St: SessionStore, P: ProcessController, N: NewsCalendar> {
    bridge: SessionBridge<ControllerSection, St>,
    calendar: TradingCalendar,
    history: DailyHistory,
    terminal: Option<P>,
    news: N,
    strict_mode_default: bool,
    sizing: SizingConfig,
    max_lot: Lots,
    /// Operator's manual news lock; the published flag also includes the calendar.
    manual_news_lock: bool,
    heartbeat_timeout: Duration,
    heartbeat_alert: OperatorAlert,
    poll_interval: std::time::Duration,
}

impl<St: SessionStore, P: ProcessController, N: NewsCalendar> Controller<St, P, N> {
    pub fn new(
        config: &AppConfig,
        store: St,
        terminal: Option<P>,
        news: N,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        let calendar = TradingCalendar::new(config.rules.schedule.clone())?;
        let bridge: SessionBridge<ControllerSection, St> =
            SessionBridge::open(store, config.bridge.clone(), now);
        let manual_news_lock =
            bridge.local().news_lock && !news.is_high_impact_window_active(now);

        Ok(Self {
            bridge,
            calendar,
            history: DailyHistory::new(&config.controller.history_path),
            terminal,
            news,
            strict_mode_default: config.rules.strict_mode_default,
            sizing: config.sizing.clone(),
            max_lot: config.rules.limits.max_lot_size,
            manual_news_lock,
            heartbeat_timeout: Duration::seconds(config.controller.heartbeat_timeout_secs as i64),
            heartbeat_alert: OperatorAlert::new("enforcer_heartbeat", 1),
            poll_interval: std::time::Duration::from_millis(config.controller.poll_interval_ms),
        })
    }

    /// Merged session document as last read.
    pub fn status(&self) -> &SessionState {
        self.bridge.view()
    }

    pub fn history(&self) -> &DailyHistory {
        &self.history
    }

    pub fn section(&self) -> &ControllerSection {
        self.bridge.local()
    }

    /// Start today's session.
    ///
    /// Refuses to start on a recovery day, after the day was ended, or when
    /// the store or the history cannot be read.
    pub fn start_session(&mut self, now: DateTime<Utc>) -> AppResult<StartOutcome> {
        if let ReadOutcome::Stale(e) = self.bridge.force_read(now) {
            error!(error = %e, "Cannot start session: session store unreadable");
            return Err(e.into());
        }
        let view = self.bridge.view().clone();
        let mut section = view.controller.clone();
        let today = self.calendar.trading_day(now);

        match section.trading_day {
            Some(day) if day == today => {
                if section.day_ended {
                    warn!(day = %today, "Session already ended today; restart refused");
                    return Ok(StartOutcome::AlreadyEnded);
                }
                if section.session_active {
                    info!(day = %today, "Session already active");
                    return Ok(StartOutcome::AlreadyActive);
                }
            }
            Some(_) => self.roll_over(&mut section, today, &view.enforcer),
            None => {
                // First session on this store; keep anything entered before it.
                section.trading_day = Some(today);
                section.session_epoch = section.session_epoch.saturating_add(1);
            }
        }

        let recovery = self.history.is_recovery_day(today).map_err(|e| {
            error!(error = %e, "Cannot read daily history; refusing to start");
            e
        })?;
        if recovery {
            warn!(day = %today, "RECOVERY DAY: two consecutive red days, trading blocked");
            section.session_active = false;
            section.day_ended = true;
            // A completed flat rest day breaks the red streak.
            self.record_day(DailyRecord::new(today, Usd::ZERO, 0));
            self.publish(section, now)?;
            return Ok(StartOutcome::RecoveryDay);
        }

        section.session_active = true;
        self.publish(section, now)?;
        info!(
            day = %today,
            epoch = self.bridge.local().session_epoch,
            "Trading session started"
        );

        if let Some(terminal) = self.terminal.as_mut() {
            if let Err(e) = terminal.launch() {
                error!(error = %e, "Terminal launch failed; retrying on the next tick");
            }
        }
        Ok(StartOutcome::Started)
    }

    /// End today's session by operator request.
    pub fn end_session(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        let view = self.bridge.view().clone();
        let mut section = view.controller.clone();
        if section.day_ended && !section.session_active {
            info!("Session already ended");
            return Ok(());
        }
        info!("Session ended by operator");
        self.finish_day(&mut section, &view.enforcer);
        self.publish(section, now)
    }

    pub fn set_bias(
        &mut self,
        bias: Bias,
        invalidation: Option<Decimal>,
        strict: bool,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut section = self.bridge.local().clone();
        section.bias = bias;
        section.invalidation_price = invalidation;
        section.strict_mode = strict || self.strict_mode_default;
        section.bias_set_at = Some(now);
        info!(
            %bias,
            invalidation = ?invalidation,
            strict = section.strict_mode,
            "Bias recorded"
        );
        self.publish(section, now)
    }

    pub fn set_news_lock(&mut self, on: bool, now: DateTime<Utc>) -> AppResult<()> {
        self.manual_news_lock = on;
        let mut section = self.bridge.local().clone();
        section.news_lock = on || self.news.is_high_impact_window_active(now);
        info!(manual = on, published = section.news_lock, "News lock updated");
        self.publish(section, now)
    }

    pub fn set_checklist(&mut self, complete: bool, now: DateTime<Utc>) -> AppResult<()> {
        let mut section = self.bridge.local().clone();
        section.checklist_complete = complete;
        info!(complete, "Checklist updated");
        self.publish(section, now)
    }

    /// One polling cycle.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        if let ReadOutcome::Stale(e) = self.bridge.read(now) {
            warn!(error = %e, "Session store read failed; using last-known state");
        }
        let view = self.bridge.view().clone();
        let mut section = view.controller.clone();
        let today = self.calendar.trading_day(now);

        if section.trading_day.is_some_and(|day| day != today) {
            self.roll_over(&mut section, today, &view.enforcer);
        }

        let enforcer = &view.enforcer;
        if section.session_active
            && !section.day_ended
            && enforcer.epoch == section.session_epoch
            && enforcer.shutdown_signal
        {
            warn!(
                reason = enforcer.shutdown_reason.as_deref().unwrap_or("unknown"),
                "AUTO-SHUTDOWN: enforcer signalled a daily limit"
            );
            self.finish_day(&mut section, enforcer);
        }

        section.news_lock = self.manual_news_lock || self.news.is_high_impact_window_active(now);

        if let Err(e) = self.publish(section, now) {
            warn!(error = %e, "Controller section not persisted; retrying next tick");
        }

        self.supervise_terminal(now);
        self.check_heartbeat(now);
    }

    /// Execute one operator command and return the reply for the operator.
    pub fn handle(&mut self, command: ControllerCommand, now: DateTime<Utc>) -> AppResult<String> {
        match command {
            ControllerCommand::Start => Ok(match self.start_session(now)? {
                StartOutcome::Started => "session started".to_string(),
                StartOutcome::RecoveryDay => {
                    "RECOVERY DAY: two consecutive red days, no trading today".to_string()
                }
                StartOutcome::AlreadyEnded => {
                    "today's session has already ended; restart tomorrow".to_string()
                }
                StartOutcome::AlreadyActive => "session already active".to_string(),
            }),
            ControllerCommand::End => {
                self.end_session(now)?;
                Ok("session ended".to_string())
            }
            ControllerCommand::Bias {
                bias,
                invalidation,
                strict,
            } => {
                self.set_bias(bias, invalidation, strict, now)?;
                Ok(format!("bias set to {bias}"))
            }
            ControllerCommand::News(on) => {
                self.set_news_lock(on, now)?;
                Ok(format!("news lock {}", if on { "on" } else { "off" }))
            }
            ControllerCommand::Checklist(done) => {
                self.set_checklist(done, now)?;
                Ok(format!("checklist {}", if done { "complete" } else { "reset" }))
            }
            ControllerCommand::Size {
                risk,
                stop_distance,
            } => {
                let lots = self.sizing.lots_for(risk, stop_distance, self.max_lot)?;
                if lots.is_zero() {
                    return Ok(format!(
                        "risk {risk} is below one lot step over {stop_distance} points"
                    ));
                }
                Ok(format!("size {lots} lots for {risk} risk over {stop_distance} points"))
            }
            ControllerCommand::Status => render_status(self.status(), now),
        }
    }

    /// Run until Ctrl+C, polling on the interval and reading operator
    /// commands from stdin.
    pub async fn run(&mut self) -> AppResult<()> {
        let mut interval = tokio::time::interval(self.poll_interval);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;

        info!(
            poll_ms = self.poll_interval.as_millis() as u64,
            "Controller running; commands: start, end, bias, news, checklist, size, status"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(Utc::now());
                }
                line = lines.next_line(), if stdin_open => {
                    match line {
                        Ok(Some(line)) if line.trim().is_empty() => {}
                        Ok(Some(line)) => self.handle_line(&line, Utc::now()),
                        Ok(None) => {
                            info!("stdin closed; operator commands disabled");
                            stdin_open = false;
                        }
                        Err(e) => {
                            warn!(?e, "stdin read failed; operator commands disabled");
                            stdin_open = false;
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down controller");
                    break;
                }
            }
        }

        if let PublishOutcome::Failed(e) = self.bridge.flush(Utc::now()) {
            warn!(error = %e, "Final controller flush failed");
        }
        Ok(())
    }

    fn handle_line(&mut self, line: &str, now: DateTime<Utc>) {
        let reply = line
            .parse::<ControllerCommand>()
            .and_then(|command| self.handle(command, now));
        match reply {
            Ok(reply) => println!("{reply}"),
            Err(e) => {
                warn!(error = %e, command = line.trim(), "Operator command failed");
                println!("error: {e}");
            }
        }
    }

    /// Begin a new trading day: record the previous one if it was never
    /// ended, then reset the section under a new epoch.
    fn roll_over(&mut self, section: &mut ControllerSection, today: NaiveDate, enforcer: &EnforcerSection) {
        if let Some(previous) = section.trading_day {
            if section.session_active
                && !section.day_ended
                && enforcer.epoch == section.session_epoch
            {
                self.record_day(day_record(previous, enforcer));
            }
        }

        let epoch = section.session_epoch.saturating_add(1);
        info!(day = %today, epoch, "Trading day rollover");
        *section = ControllerSection {
            trading_day: Some(today),
            session_epoch: epoch,
            strict_mode: self.strict_mode_default,
            controller_seq: section.controller_seq,
            ..ControllerSection::default()
        };
        self.manual_news_lock = false;
    }

    /// Close the day: no restart until the next trading day.
    fn finish_day(&mut self, section: &mut ControllerSection, enforcer: &EnforcerSection) {
        section.session_active = false;
        section.day_ended = true;

        if let Some(day) = section.trading_day {
            let record = if enforcer.epoch == section.session_epoch {
                day_record(day, enforcer)
            } else {
                DailyRecord::new(day, Usd::ZERO, 0)
            };
            self.record_day(record);
        }

        if let Some(terminal) = self.terminal.as_mut() {
            if let Err(e) = terminal.kill() {
                error!(error = %e, "Failed to stop terminal at day end");
            }
        }
    }

    fn record_day(&self, record: DailyRecord) {
        if let Err(e) = self.history.record_day(record) {
            error!(error = %e, path = %self.history.path().display(), "Failed to record daily result");
        }
    }

    fn publish(&mut self, section: ControllerSection, now: DateTime<Utc>) -> AppResult<()> {
        match self.bridge.publish(section, now, true) {
            PublishOutcome::Failed(e) => Err(e.into()),
            PublishOutcome::Deferred => {
                warn!("Session store not read yet; controller change deferred");
                Ok(())
            }
            PublishOutcome::Written(seq) => {
                debug!(seq, "Controller section written");
                Ok(())
            }
            PublishOutcome::Unchanged => Ok(()),
        }
    }

    /// Kill the terminal during the daily break and after the day ends;
    /// relaunch it only when the session is active and nothing holds it down.
    fn supervise_terminal(&mut self, now: DateTime<Utc>) {
        let Some(terminal) = self.terminal.as_mut() else {
            return;
        };
        let view = self.bridge.view();
        let controller = &view.controller;
        let enforcer = &view.enforcer;
        let same_epoch = enforcer.epoch == controller.session_epoch;
        let in_daily_break = self.calendar.in_daily_break(now);

        if controller.day_ended || in_daily_break {
            if terminal.is_running() {
                info!(
                    day_ended = controller.day_ended,
                    in_daily_break, "Stopping terminal"
                );
                if let Err(e) = terminal.kill() {
                    error!(error = %e, "Failed to stop terminal");
                }
            }
            return;
        }

        let held = same_epoch && (enforcer.shutdown_signal || enforcer.break_active);
        if controller.session_active && !held && !terminal.is_running() {
            info!("Relaunching terminal");
            if let Err(e) = terminal.launch() {
                error!(error = %e, "Terminal launch failed");
            }
        }
    }

    fn check_heartbeat(&mut self, now: DateTime<Utc>) {
        let controller = &self.bridge.view().controller;
        if !controller.session_active || controller.day_ended {
            self.heartbeat_alert.recover(now);
            return;
        }
        match self.bridge.view().enforcer.last_evaluated_at {
            Some(at) if now - at <= self.heartbeat_timeout => self.heartbeat_alert.recover(now),
            Some(at) => self.heartbeat_alert.fail(
                format!("no enforcer evaluation for {}s", (now - at).num_seconds()),
                now,
            ),
            None => self
                .heartbeat_alert
                .fail("enforcer has never evaluated", now),
        }
    }
}

fn day_record(day: NaiveDate, enforcer: &EnforcerSection) -> DailyRecord {
    DailyRecord::new(day, enforcer.realized_pnl(), enforcer.trades_today)
}

/// Operator-facing status: the merged session document as JSON, plus the
/// cooldown remaining in whole minutes.
pub fn render_status(state: &SessionState, now: DateTime<Utc>) -> AppResult<String> {
    let document = serde_json::to_string_pretty(state)
        .map_err(|e| AppError::Command(format!("Failed to render status: {e}")))?;
    let cooldown = schedule::cooldown_minutes_remaining(&state.enforcer, now);
    Ok(format!("{document}\ncooldown_minutes_remaining: {cooldown}"))
}
