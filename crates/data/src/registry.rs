use std::collections::HashSet;

use models::{Broker, BrokerInfo, DetectionResult, ParseResult, TradeInputRecord};
use tracing::{debug, info};

use crate::detection::extract_header_line;
use crate::importers::default_parsers;
use crate::report::attach_validation;
use crate::{BrokerParser, BrokerSelection, ImportContext, ImportError, ParseOptions, Result};

/// The set of parsers an import run may use. Built once and passed to
/// whoever needs to detect or parse files.
pub struct Registry {
    ctx: ImportContext,
    parsers: Vec<Box<dyn BrokerParser>>,
}

impl Registry {
    /// An empty registry. Parsing falls back to nothing until parsers are registered.
    pub fn new(ctx: ImportContext) -> Self {
        Self { ctx, parsers: Vec::new() }
    }

    pub fn with_default_parsers(ctx: ImportContext) -> Self {
        let parsers = default_parsers(&ctx);
        Self { ctx, parsers }
    }

    pub fn context(&self) -> &ImportContext {
        &self.ctx
    }

    /// Adds a parser, replacing any registered for the same platform.
    pub fn register(&mut self, parser: Box<dyn BrokerParser>) {
        let broker = parser.broker();
        self.parsers.retain(|p| p.broker() != broker);
        self.parsers.push(parser);
    }

    pub fn parser(&self, broker: Broker) -> Option<&dyn BrokerParser> {
        self.parsers.iter().find(|p| p.broker() == broker).map(|p| p.as_ref())
    }

    /// Scores every registered parser and returns the most confident one.
    pub fn detect_broker_format(&self, content: &str) -> DetectionResult {
        let headers = extract_header_line(content);
        let mut scores: Vec<(Broker, f64)> = self
            .parsers
            .iter()
            .map(|p| (p.broker(), p.detect(content, &headers).clamp(0.0, 1.0)))
            .collect();
        // Stable: equal scores keep registration order.
        scores.sort_by(|a, b| b.1.total_cmp(&a.1));
        debug!("Detection scores: {:?}", scores);

        let Some(&(broker, confidence)) = scores.first() else {
            return DetectionResult {
                broker: Broker::Generic,
                confidence: 0.0,
                reason: "No parsers registered".to_string(),
            };
        };

        let reason = if broker == Broker::Generic {
            "No broker-specific format recognised; using generic column matching".to_string()
        } else {
            let mut reason = format!(
                "Matched {} export headers (confidence {:.2})",
                broker.display_name(),
                confidence
            );
            if let Some((runner_up, score)) = scores.get(1) {
                reason.push_str(&format!("; next best {} at {:.2}", runner_up.display_name(), score));
            }
            reason
        };

        DetectionResult { broker, confidence, reason }
    }

    /// Parses a file with the requested parser, or the detected one for
    /// `BrokerSelection::Auto`, then runs baseline validation.
    pub fn parse_csv(&self, content: &str, options: &ParseOptions) -> Result<ParseResult> {
        let requested = match options.broker {
            BrokerSelection::Auto => {
                let detection = self.detect_broker_format(content);
                info!(
                    "Detected {} (confidence {:.2}): {}",
                    detection.broker, detection.confidence, detection.reason
                );
                detection.broker
            }
            BrokerSelection::Broker(broker) => broker,
        };

        let parser = match self.parser(requested) {
            Some(p) => p,
            None => {
                debug!("No parser registered for {}; falling back to generic", requested);
                self.parser(Broker::Generic)
                    .ok_or_else(|| ImportError::UnsupportedSource(requested.id().to_string()))?
            }
        };

        let mut result = parser.parse(content)?;
        if !options.skip_validation {
            let issues = parser.validate(&result.trades);
            attach_validation(&mut result, issues);
        }

        info!(
            "{}: {} trades, {} errors, {} warnings, {} duplicates",
            result.broker,
            result.trades.len(),
            result.errors.len(),
            result.warnings.len(),
            result.stats.duplicates
        );
        Ok(result)
    }

    /// Converts every trade whose source row has no error. The account id
    /// falls back to the configured default.
    pub fn convert_trades_to_input(&self, result: &ParseResult, account_id: Option<&str>) -> Vec<TradeInputRecord> {
        let Some(parser) = self.parser(result.broker).or_else(|| self.parser(Broker::Generic)) else {
            return Vec::new();
        };
        let error_rows: HashSet<usize> = result.rows_with_errors().into_iter().collect();
        let account_id = account_id.or(self.ctx.settings.account_id.as_deref());

        result
            .trades
            .iter()
            .filter(|t| !error_rows.contains(&t.source_row))
            .map(|t| parser.convert_to_trade_input(t, account_id))
            .collect()
    }

    pub fn supported_brokers(&self) -> Vec<BrokerInfo> {
        self.parsers
            .iter()
            .map(|p| {
                let broker = p.broker();
                BrokerInfo {
                    id: broker.id().to_string(),
                    display_name: broker.display_name().to_string(),
                }
            })
            .collect()
    }
}
