use crate::application::command::Command;
use crate::domain::ids::{GuestId, QrToken, ServiceId};
use crate::domain::purchase::{NewPurchase, ServiceType};
use crate::domain::user::User;
use crate::error::{CafeError, Result};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum CommandKind {
    Guest,
    Purchase,
    Reserve,
    Confirm,
    Redeem,
    Pause,
    Resume,
    Checkout,
}

/// One row of a replay file. Columns a command does not use may be empty
/// or missing altogether.
#[derive(Debug, Deserialize)]
struct CommandRecord {
    command: CommandKind,
    #[serde(default)]
    at: Option<i64>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    guest: Option<String>,
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    service_type: Option<ServiceType>,
    #[serde(default)]
    amount: Option<Decimal>,
    #[serde(default)]
    valid_until: Option<i64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    service_id: Option<String>,
}

impl CommandRecord {
    fn into_command(self) -> Result<Command> {
        if self.command == CommandKind::Guest {
            let id = required(self.guest, "guest")?;
            return Ok(Command::Guest(User::guest(
                GuestId::from(id),
                self.name.unwrap_or_default(),
                self.email.unwrap_or_default(),
            )));
        }

        let at = timestamp(required(self.at, "at")?)?;
        let qr_code = self.token.as_deref().and_then(QrToken::parse);

        match self.command {
            CommandKind::Purchase | CommandKind::Reserve => {
                let service_name = required(self.service, "service")?;
                // Catalogue id defaults to the service name.
                let service_id = self.service_id.unwrap_or_else(|| service_name.clone());
                let order = NewPurchase {
                    guest: GuestId::from(required(self.guest, "guest")?),
                    service_id: ServiceId::from(service_id),
                    service_name,
                    service_type: required(self.service_type, "service_type")?,
                    amount: required(self.amount, "amount")?,
                    qr_code,
                    valid_until: self.valid_until.map(timestamp).transpose()?,
                };
                Ok(if self.command == CommandKind::Purchase {
                    Command::Sell { order, at }
                } else {
                    Command::Reserve { order, at }
                })
            }
            kind => {
                let code = required(qr_code, "token")?;
                Ok(match kind {
                    CommandKind::Confirm => Command::Confirm { code, at },
                    CommandKind::Redeem => Command::Redeem { code, at },
                    CommandKind::Pause => Command::Pause { code, at },
                    CommandKind::Resume => Command::Resume { code, at },
                    _ => Command::CheckOut { code, at },
                })
            }
        }
    }
}

fn required<T>(value: Option<T>, column: &str) -> Result<T> {
    value.ok_or_else(|| CafeError::ValidationError(format!("Missing value for `{column}`")))
}

fn timestamp(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| CafeError::ValidationError(format!("Timestamp out of range: {millis}")))
}

/// Reads staff commands from a CSV source.
///
/// Header: `command,at,token,guest,service,service_type,amount,valid_until,name,email`,
/// optionally followed by `service_id`.
/// Timestamps are epoch milliseconds. Whitespace is trimmed and short rows
/// are accepted.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily parses each row. A bad row yields an error and the iterator
    /// moves on to the next one.
    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize::<CommandRecord>()
            .map(|result| result.map_err(CafeError::from).and_then(CommandRecord::into_command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const HEADER: &str = "command,at,token,guest,service,service_type,amount,valid_until,name,email\n";

    fn read(rows: &str) -> Vec<Result<Command>> {
        let data = format!("{HEADER}{rows}");
        CommandReader::new(data.as_bytes()).commands().collect()
    }

    fn ms(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    #[test]
    fn test_reader_purchase_and_guest() {
        let results = read(
            "guest, , , g1, , , , , Ada, ada@example.com\n\
             purchase, 1000, T1, g1, Weekly pass, weekly, 7000, 605000, ,\n",
        );
        assert_eq!(results.len(), 2);

        let Command::Guest(user) = results[0].as_ref().unwrap() else {
            panic!("expected a guest");
        };
        assert_eq!(user.name, "Ada");

        let Command::Sell { order, at } = results[1].as_ref().unwrap() else {
            panic!("expected a sale");
        };
        assert_eq!(*at, ms(1000));
        assert_eq!(order.service_type, ServiceType::Weekly);
        assert_eq!(order.amount, dec!(7000));
        assert_eq!(order.qr_code.as_ref().map(QrToken::as_str), Some("T1"));
        assert_eq!(order.valid_until, Some(ms(605_000)));
        assert_eq!(order.service_id.as_str(), "Weekly pass");
    }

    #[test]
    fn test_reader_explicit_service_id() {
        let data = "command,at,token,guest,service,service_type,amount,valid_until,name,email,service_id\n\
                    purchase,1,T1,g1,Weekly pass,weekly,7000,,,,svc-weekly\n";
        let results: Vec<Result<Command>> = CommandReader::new(data.as_bytes()).commands().collect();
        let Command::Sell { order, .. } = results[0].as_ref().unwrap() else {
            panic!("expected a sale");
        };
        assert_eq!(order.service_id.as_str(), "svc-weekly");
    }

    #[test]
    fn test_reader_short_session_rows() {
        let results = read("redeem,10,T1\npause,20,T1\nresume,30,T1\ncheckout,40,T1\n");
        let commands: Vec<Command> = results.into_iter().map(|r| r.unwrap()).collect();
        assert!(matches!(commands[0], Command::Redeem { .. }));
        assert!(matches!(commands[3], Command::CheckOut { .. }));
        assert_eq!(commands[2].at(), Some(ms(30)));
    }

    #[test]
    fn test_reader_blank_token_generates_later() {
        let results = read("reserve,5,,g1,Coffee,one-off,300\n");
        let Command::Reserve { order, .. } = results[0].as_ref().unwrap() else {
            panic!("expected a reservation");
        };
        assert_eq!(order.qr_code, None);
        assert_eq!(order.service_type, ServiceType::OneOff);
    }

    #[test]
    fn test_reader_malformed_lines() {
        let results = read(
            "refund,1,T1\n\
             redeem,,T1\n\
             pause,5\n\
             purchase,1,T1,g1,Coffee,espresso,300\n\
             redeem,7,T1\n",
        );
        assert_eq!(results.len(), 5);
        assert!(matches!(results[0], Err(CafeError::CsvError(_))));
        assert!(matches!(results[1], Err(CafeError::ValidationError(_))));
        assert!(matches!(results[2], Err(CafeError::ValidationError(_))));
        assert!(results[3].is_err());
        assert!(results[4].is_ok());
    }
}
