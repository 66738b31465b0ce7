//! Message formatting for Telegram and the terminal

use crate::analysis::{
    AlertDirection, AlertSeverity, PortfolioHealth, PortfolioRecommendations, PortfolioReport, PriceAlert,
    Priority, RiskLevel,
};
use chrono::Utc;
use portfolio_core::Action;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Where a message will be shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Telegram,
    Cli,
}

/// Renders tracker output for one channel
///
/// Implementors supply the markup primitives; message layouts are shared.
pub trait Formatter: Send + Sync {
    fn channel(&self) -> Channel;

    /// Emphasize a short label
    fn bold(&self, text: &str) -> String;

    /// Make free text (headlines, reasons) safe for the channel's markup
    fn escape(&self, text: &str) -> String;

    /// Emoji prefixes are only used where the channel renders them well
    fn icon(&self, emoji: &'static str) -> &'static str;

    fn format_daily_summary(&self, report: &PortfolioReport, recs: Option<&PortfolioRecommendations>) -> String {
        let v = &report.valuation;
        let mut out = String::new();

        let _ = writeln!(
            out,
            "{}{} ({})",
            self.icon("📊 "),
            self.bold("Daily Portfolio Update"),
            v.as_of.format("%Y-%m-%d")
        );
        out.push('\n');
        let _ = writeln!(out, "{}Total value: {}", self.icon("💰 "), money(v.total_portfolio_value));
        if let Some(pct) = v.daily_change_pct {
            let _ = writeln!(out, "{}Today: {}", self.icon(trend_icon(pct)), signed_pct(pct));
        }
        let _ = writeln!(
            out,
            "{}Total gain/loss: {} ({})",
            self.icon("💵 "),
            signed_money(v.total_gain_loss),
            signed_pct(v.total_gain_loss_pct)
        );
        let _ = writeln!(out, "{}Cash: {} ({:.1}%)", self.icon("🏦 "), money(v.cash), v.cash_pct());

        if !v.positions.is_empty() {
            out.push('\n');
            let _ = writeln!(out, "{}", self.bold("Positions"));
            for p in v.positions.values() {
                let today = p
                    .daily_change_pct
                    .map(|pct| format!(", {} today", signed_pct(pct)))
                    .unwrap_or_default();
                let _ = writeln!(
                    out,
                    "{}{}: {}{} | P&L {} ({})",
                    self.icon(if p.gain_loss >= 0.0 { "🟢 " } else { "🔴 " }),
                    p.symbol,
                    money(p.current_price),
                    today,
                    signed_money(p.gain_loss),
                    signed_pct(p.gain_loss_pct)
                );
            }
        }

        if report.biggest_gainer.is_some() || report.biggest_loser.is_some() || report.benchmark.is_some() {
            out.push('\n');
        }
        if let Some(m) = &report.biggest_gainer {
            let _ = writeln!(out, "{}Best: {} {}", self.icon("🏆 "), m.symbol, signed_pct(m.gain_loss_pct));
        }
        if let Some(m) = &report.biggest_loser {
            let _ = writeln!(out, "{}Worst: {} {}", self.icon("📉 "), m.symbol, signed_pct(m.gain_loss_pct));
        }
        if let Some(b) = &report.benchmark {
            let verdict = if b.outperforming { "outperforming" } else { "underperforming" };
            let _ = writeln!(
                out,
                "{}vs {}: {} vs {} today, {} by {:.2} pts",
                self.icon("📏 "),
                b.benchmark_symbol,
                signed_pct(b.portfolio_change_pct),
                signed_pct(b.benchmark_change_pct),
                verdict,
                b.performance_difference.abs()
            );
        }

        if let Some(recs) = recs {
            out.push('\n');
            let _ = writeln!(
                out,
                "{}Health: {} | {}Risk: {}",
                self.icon(health_icon(recs.health)),
                recs.health,
                self.icon(risk_icon(recs.risk_level)),
                recs.risk_level
            );
            let market = &recs.sentiment.market;
            let _ = writeln!(
                out,
                "{}News sentiment: {} | Market mood: {}",
                self.icon("📰 "),
                recs.sentiment.overall.label,
                market.mood
            );
        }

        out.trim_end().to_string()
    }

    /// Empty when there are no alerts
    fn format_alerts(&self, alerts: &[PriceAlert]) -> String {
        if alerts.is_empty() {
            return String::new();
        }

        let mut out = String::new();
        let _ = writeln!(out, "{}{}", self.icon("🚨 "), self.bold("Price Alerts"));
        for a in alerts {
            let icon = match a.direction {
                AlertDirection::Gain => "🚀 ",
                AlertDirection::Loss => "🔻 ",
            };
            let severity = match a.severity {
                AlertSeverity::High => " [HIGH]",
                AlertSeverity::Medium => "",
            };
            let _ = writeln!(
                out,
                "{}{} {} ({}) now {}, position {}{}",
                self.icon(icon),
                self.bold(&a.symbol),
                signed_pct(a.change_pct),
                signed_money(a.change_amount),
                money(a.current_price),
                money(a.position_value),
                severity
            );
        }
        out.trim_end().to_string()
    }

    fn format_recommendations(&self, recs: &PortfolioRecommendations) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}{}", self.icon("💡 "), self.bold("Recommendations"));
        let _ = writeln!(out, "Health: {} | Risk: {}", recs.health, recs.risk_level);

        out.push('\n');
        let _ = writeln!(out, "{}", self.bold("Actions"));
        if recs.actions.is_empty() {
            let _ = writeln!(out, "No action needed, hold current positions");
        }
        for (i, a) in recs.actions.iter().enumerate() {
            let subject = a.symbol.as_deref().map(|s| format!(" {s}")).unwrap_or_default();
            let confidence = a.confidence.map(|c| format!(" ({c:.0}%)")).unwrap_or_default();
            let _ = writeln!(
                out,
                "{}. {}{}{}{}: {}",
                i + 1,
                self.icon(priority_icon(a.priority)),
                a.action,
                subject,
                confidence,
                self.escape(&a.reason)
            );
        }

        if !recs.stocks.is_empty() {
            out.push('\n');
            let _ = writeln!(out, "{}", self.bold("Holdings"));
            for s in &recs.stocks {
                let rec = &s.recommendation;
                let rsi = s
                    .technical
                    .snapshot
                    .rsi
                    .map(|r| format!(", RSI {r:.0} ({})", s.technical.rsi_trend))
                    .unwrap_or_default();
                let _ = writeln!(
                    out,
                    "{}{}: {} ({:.0}%){}, news {}",
                    self.icon(action_icon(rec.action)),
                    s.symbol,
                    rec.label(),
                    rec.confidence,
                    rsi,
                    s.sentiment.label
                );
                if let Some(fraction) = rec.sell_fraction {
                    let _ = writeln!(out, "   sell about {:.0}% of the position", fraction * 100.0);
                }
                for risk in &rec.risk_factors {
                    let _ = writeln!(out, "   {}{}", self.icon("⚠️ "), self.escape(risk));
                }
            }
        }

        for (symbol, reason) in &recs.skipped {
            let _ = writeln!(out, "{}{symbol}: not scored ({})", self.icon("⚠️ "), self.escape(reason));
        }

        if !recs.sentiment.highlights.is_empty() {
            out.push('\n');
            let _ = writeln!(out, "{}", self.bold("Headlines"));
            for h in &recs.sentiment.highlights {
                let _ = writeln!(out, "{} {}: {}", h.sentiment, h.symbol, self.escape(&h.title));
            }
        }

        out.trim_end().to_string()
    }

    fn format_error(&self, error: &str) -> String {
        format!("{}{} {}", self.icon("❌ "), self.bold("Error:"), self.escape(error))
    }

    fn format_test_message(&self) -> String {
        format!(
            "{}{}\nConnection OK at {}",
            self.icon("✅ "),
            self.bold("Portfolio tracker test"),
            Utc::now().format("%Y-%m-%d %H:%M UTC")
        )
    }
}

/// Telegram legacy Markdown
pub struct TelegramFormatter;

impl Formatter for TelegramFormatter {
    fn channel(&self) -> Channel {
        Channel::Telegram
    }

    fn bold(&self, text: &str) -> String {
        format!("*{}*", self.escape(text))
    }

    fn escape(&self, text: &str) -> String {
        let mut escaped = String::with_capacity(text.len());
        for c in text.chars() {
            if matches!(c, '_' | '*' | '`' | '[') {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped
    }

    fn icon(&self, emoji: &'static str) -> &'static str {
        emoji
    }
}

/// Plain text for terminals
pub struct CliFormatter;

impl Formatter for CliFormatter {
    fn channel(&self) -> Channel {
        Channel::Cli
    }

    fn bold(&self, text: &str) -> String {
        text.to_string()
    }

    fn escape(&self, text: &str) -> String {
        text.to_string()
    }

    fn icon(&self, _emoji: &'static str) -> &'static str {
        ""
    }
}

pub struct FormatterFactory;

impl FormatterFactory {
    pub fn create(channel: Channel) -> Box<dyn Formatter> {
        match channel {
            Channel::Telegram => Box::new(TelegramFormatter),
            Channel::Cli => Box::new(CliFormatter),
        }
    }
}

/// `$1,234.56`, with a leading minus for negatives
pub fn money(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", cents % 100)
}

fn signed_money(value: f64) -> String {
    if value >= 0.0 {
        format!("+{}", money(value))
    } else {
        money(value)
    }
}

fn signed_pct(value: f64) -> String {
    format!("{value:+.2}%")
}

fn trend_icon(pct: f64) -> &'static str {
    if pct >= 0.0 { "📈 " } else { "📉 " }
}

fn health_icon(health: PortfolioHealth) -> &'static str {
    match health {
        PortfolioHealth::Excellent => "🌟 ",
        PortfolioHealth::Good => "✅ ",
        PortfolioHealth::Fair => "⚖️ ",
        PortfolioHealth::Poor => "⚠️ ",
    }
}

fn priority_icon(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "🔴 ",
        Priority::Medium => "🟡 ",
        Priority::Low => "🟢 ",
    }
}

fn action_icon(action: Action) -> &'static str {
    match action {
        Action::Buy => "🟢 ",
        Action::Sell => "🔴 ",
        Action::Hold => "⚪ ",
    }
}

fn risk_icon(risk: RiskLevel) -> &'static str {
    match risk {
        RiskLevel::High => "🔥 ",
        RiskLevel::Medium => "⚠️ ",
        RiskLevel::Low => "🛡️ ",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{
        BenchmarkComparison, Mover, PortfolioValuation, PositionValuation, PriceSource, PrioritizedAction,
    };
    use crate::analysis::sentiment::PortfolioSentiment;
    use std::collections::BTreeMap;

    fn report() -> PortfolioReport {
        let position = PositionValuation {
            symbol: "AAPL".to_string(),
            shares: 10.0,
            avg_price: 100.0,
            current_price: 120.0,
            price_source: PriceSource::Live,
            total_invested: 1_000.0,
            current_value: 1_200.0,
            gain_loss: 200.0,
            gain_loss_pct: 20.0,
            daily_change: Some(6.79),
            daily_change_pct: Some(6.0),
            volume: None,
            high: None,
            low: None,
            previous_close: None,
        };
        let valuation = PortfolioValuation {
            positions: BTreeMap::from([("AAPL".to_string(), position)]),
            total_invested: 1_000.0,
            current_value: 1_200.0,
            total_gain_loss: 200.0,
            total_gain_loss_pct: 20.0,
            daily_change_pct: Some(6.0),
            cash: 1_480.0,
            total_portfolio_value: 2_680.0,
            as_of: Utc::now(),
        };
        PortfolioReport {
            alerts: vec![alert()],
            benchmark: Some(BenchmarkComparison {
                benchmark_symbol: "VOO".to_string(),
                benchmark_price: 400.0,
                benchmark_change_pct: 0.5,
                portfolio_change_pct: 6.0,
                portfolio_return_pct: 20.0,
                outperforming: true,
                performance_difference: 5.5,
            }),
            biggest_gainer: Some(Mover {
                symbol: "AAPL".to_string(),
                gain_loss_pct: 20.0,
            }),
            biggest_loser: None,
            valuation,
        }
    }

    fn alert() -> PriceAlert {
        PriceAlert {
            symbol: "TSLA".to_string(),
            current_price: 180.0,
            change_pct: -12.0,
            change_amount: -24.55,
            threshold: 5.0,
            direction: AlertDirection::Loss,
            severity: AlertSeverity::High,
            position_value: 900.0,
        }
    }

    fn recs(actions: Vec<PrioritizedAction>) -> PortfolioRecommendations {
        PortfolioRecommendations {
            generated_at: Utc::now(),
            stocks: vec![],
            portfolio: vec![],
            health: PortfolioHealth::Good,
            risk_level: RiskLevel::Medium,
            actions,
            sentiment: PortfolioSentiment::default(),
            skipped: Default::default(),
        }
    }

    #[test]
    fn test_money() {
        assert_eq!(money(1_234.5), "$1,234.50");
        assert_eq!(money(1_000_000.0), "$1,000,000.00");
        assert_eq!(money(999.999), "$1,000.00");
        assert_eq!(money(-42.1), "-$42.10");
        assert_eq!(money(-0.001), "$0.00");
        assert_eq!(signed_money(5.0), "+$5.00");
    }

    #[test]
    fn test_telegram_escape() {
        let f = TelegramFormatter;
        assert_eq!(f.escape("EPS_beat *wow* [link]"), "EPS\\_beat \\*wow\\* \\[link]");
        assert_eq!(f.bold("Cash"), "*Cash*");
    }

    #[test]
    fn test_daily_summary_telegram() {
        let text = TelegramFormatter.format_daily_summary(&report(), None);
        assert!(text.starts_with("📊 *Daily Portfolio Update*"));
        assert!(text.contains("Total value: $2,680.00"));
        assert!(text.contains("AAPL: $120.00, +6.00% today | P&L +$200.00 (+20.00%)"));
        assert!(text.contains("vs VOO: +6.00% vs +0.50% today, outperforming by 5.50 pts"));
        assert!(!text.contains("Health"));
    }

    #[test]
    fn test_daily_summary_cli_is_plain() {
        let text = CliFormatter.format_daily_summary(&report(), Some(&recs(vec![])));
        assert!(text.starts_with("Daily Portfolio Update"));
        assert!(!text.contains('*'));
        assert!(text.contains("Health: good | Risk: medium"));
        assert!(text.contains("Best: AAPL +20.00%"));
    }

    #[test]
    fn test_alerts() {
        assert!(TelegramFormatter.format_alerts(&[]).is_empty());

        let text = TelegramFormatter.format_alerts(&[alert()]);
        assert!(text.contains("*TSLA* -12.00% (-$24.55) now $180.00"));
        assert!(text.ends_with("[HIGH]"));
    }

    #[test]
    fn test_recommendations() {
        let text = CliFormatter.format_recommendations(&recs(vec![]));
        assert!(text.contains("No action needed"));

        let text = TelegramFormatter.format_recommendations(&recs(vec![PrioritizedAction {
            priority: Priority::High,
            symbol: Some("TSLA".to_string()),
            action: "STRONG SELL".to_string(),
            reason: "Stop_loss hit".to_string(),
            confidence: Some(90.0),
        }]));
        assert!(text.contains("1. 🔴 STRONG SELL TSLA (90%): Stop\\_loss hit"));

        let mut skipped = recs(vec![]);
        skipped.skipped.insert("NVDA".to_string(), "bad shares".to_string());
        assert!(CliFormatter.format_recommendations(&skipped).contains("NVDA: not scored (bad shares)"));
    }

    #[test]
    fn test_error_and_test_message() {
        assert_eq!(CliFormatter.format_error("boom"), "Error: boom");
        assert_eq!(TelegramFormatter.format_error("boom"), "❌ *Error:* boom");
        assert!(FormatterFactory::create(Channel::Cli)
            .format_test_message()
            .starts_with("Portfolio tracker test"));
    }
}
