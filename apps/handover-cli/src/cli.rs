use clap::{Args, Parser, Subcommand};
use handover_storage::{CallerRole, PickupId, ReceiverKind, UserRef};

#[derive(Parser)]
#[command(name = "handover")]
#[command(about = "Pickup handover operator CLI")]
pub struct Cli {
    /// Database URL
    #[arg(long, env = "HANDOVER_DATABASE_URL", default_value = "sqlite://handover.db")]
    pub database_url: String,

    #[command(subcommand)]
    pub command: Command,
}

/// The already-authenticated identity a command acts as.
#[derive(Args, Clone, Copy)]
pub struct CallerArgs {
    /// User the command acts as
    #[arg(long = "as", value_name = "USER")]
    pub user: UserRef,

    /// Role the user acts in: donor, ngo or compost-agency
    #[arg(long)]
    pub role: CallerRole,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a pickup in `pending`
    Create {
        /// Donating user
        #[arg(long)]
        donor: UserRef,

        /// Receiving organisation user
        #[arg(long)]
        receiver: UserRef,

        /// Kind of receiver: ngo or compost-agency
        #[arg(long, default_value = "ngo")]
        receiver_kind: ReceiverKind,

        /// Waste category, e.g. "food"
        #[arg(long)]
        waste_type: String,

        /// What is being handed over
        #[arg(long)]
        item: String,

        #[arg(long)]
        quantity: f64,

        #[arg(long)]
        description: Option<String>,
    },
    /// Show one pickup (either party)
    Show {
        pickup: PickupId,

        #[command(flatten)]
        caller: CallerArgs,
    },
    /// List pickups where the caller is donor or receiver
    List {
        #[command(flatten)]
        caller: CallerArgs,
    },
    /// Propose 1 to 3 pickup dates (receiver)
    Propose {
        pickup: PickupId,

        #[command(flatten)]
        caller: CallerArgs,

        /// Candidate as "YYYY-MM-DD H:00 AM|PM"; repeat for more
        #[arg(long = "date", required = true)]
        dates: Vec<String>,
    },
    /// Confirm one of the proposed dates (donor)
    Confirm {
        pickup: PickupId,

        #[command(flatten)]
        caller: CallerArgs,

        /// Chosen date as "YYYY-MM-DD H:00 AM|PM"
        #[arg(long)]
        date: String,
    },
    /// Issue the QR token for a scheduled pickup (receiver)
    RequestToken {
        pickup: PickupId,

        #[command(flatten)]
        caller: CallerArgs,
    },
    /// Present a scanned QR secret (donor)
    Present {
        pickup: PickupId,

        #[command(flatten)]
        caller: CallerArgs,

        /// Secret read from the QR code
        secret: String,
    },
    /// Complete an accepted pickup and credit the donor (receiver)
    Complete {
        pickup: PickupId,

        #[command(flatten)]
        caller: CallerArgs,

        #[arg(long)]
        notes: Option<String>,

        /// Extra points on top of the base credit
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        bonus: i64,
    },
    /// Cancel a pickup (either party)
    Cancel {
        pickup: PickupId,

        #[command(flatten)]
        caller: CallerArgs,
    },
    /// Mark expired but still active tokens as expired
    Sweep,
    /// Retry points credits the ledger has not acknowledged
    Redeliver,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_caller_and_repeated_dates() {
        let pickup = PickupId::new();
        let user = UserRef(uuid::Uuid::new_v4());
        let cli = Cli::try_parse_from([
            "handover",
            "propose",
            &pickup.to_string(),
            "--as",
            &user.to_string(),
            "--role",
            "ngo",
            "--date",
            "2025-01-10 10:00 AM",
            "--date",
            "2025-01-11 2:00 PM",
        ])
        .unwrap();

        match cli.command {
            Command::Propose {
                pickup: p,
                caller,
                dates,
            } => {
                assert_eq!(p, pickup);
                assert_eq!(caller.user, user);
                assert_eq!(caller.role, CallerRole::Ngo);
                assert_eq!(dates.len(), 2);
            }
            _ => panic!("expected propose"),
        }
    }

    #[test]
    fn negative_bonus_reaches_the_core() {
        let cli = Cli::try_parse_from([
            "handover",
            "complete",
            &PickupId::new().to_string(),
            "--as",
            &uuid::Uuid::new_v4().to_string(),
            "--role",
            "compost-agency",
            "--bonus",
            "-3",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Complete { bonus: -3, .. }));
    }

    #[test]
    fn show_requires_a_caller() {
        let pickup = PickupId::new().to_string();
        assert!(Cli::try_parse_from(["handover", "show", &pickup]).is_err());

        let user = UserRef(uuid::Uuid::new_v4());
        let cli = Cli::try_parse_from([
            "handover",
            "show",
            &pickup,
            "--as",
            &user.to_string(),
            "--role",
            "donor",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Show { caller, .. } if caller.user == user
        ));
    }

    #[test]
    fn unknown_role_is_rejected() {
        let result = Cli::try_parse_from([
            "handover",
            "cancel",
            &PickupId::new().to_string(),
            "--as",
            &uuid::Uuid::new_v4().to_string(),
            "--role",
            "courier",
        ]);
        assert!(result.is_err());
    }
}
