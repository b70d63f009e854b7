use std::{env, error::Error};

use arcade::{
    domain::core::{
        quote, AvailabilityRule, AvailabilitySnapshot, PriceBreakdown, SessionLength, SlotBoard,
        SlotState,
    },
    ArcadeConfig,
};
use serde::Serialize;
use tracing::{error, info, Level};

const USAGE: &str = "usage: arcade_quote <snapshot.json> <duration_minutes> <controllers>";

#[tokio::main]
async fn main() {
    match ArcadeConfig::load() {
        Ok(config) => {
            tracing_subscriber::fmt()
                .with_max_level(Level::from(&config.logger.level))
                .init();
            if let Err(error) = run(&config, env::args().skip(1).collect()).await {
                error!("アプリケーションエラー: {}", error);
                std::process::exit(1);
            }
        }
        Err(error) => {
            tracing_subscriber::fmt::init();
            error!("アプリケーションエラー: {}", error);
            std::process::exit(1);
        }
    }
}

#[derive(Serialize)]
struct Quote {
    date: String,
    setup: u32,
    duration_minutes: u32,
    controllers: u32,
    open_slots: Vec<String>,
    price: PriceBreakdown,
}

async fn run(config: &ArcadeConfig, args: Vec<String>) -> Result<(), Box<dyn Error>> {
    let (path, duration, controllers) = match args.as_slice() {
        [path, duration, controllers] => (path, duration.parse::<u32>()?, controllers.parse::<u32>()?),
        _ => return Err(USAGE.into()),
    };

    let grid = config.slot_grid()?;
    let rates = config.rate_card()?;
    let price = quote(duration, controllers, &rates)?;
    let length = SessionLength::try_from(duration)?;

    let json = tokio::fs::read_to_string(path).await?;
    let snapshot = serde_json::from_str::<AvailabilitySnapshot>(&json)?;
    info!(
        "空き状況を読み込みました: {} setup {} ({}件)",
        snapshot.date(),
        snapshot.resource(),
        snapshot.busy().len()
    );

    let board = snapshot.board(&grid, length, AvailabilityRule::default());
    print_board(&board);
    println!();
    println!("基本料金:         {}", price.base_price());
    println!("コントローラー追加: {}", price.controller_charges());
    println!("合計:             {}", price.total_price());

    let summary = Quote {
        date: snapshot.date().to_string(),
        setup: snapshot.resource().number(),
        duration_minutes: duration,
        controllers,
        open_slots: board.open_slots().map(|t| t.to_string()).collect(),
        price,
    };
    println!();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn print_board(board: &SlotBoard) {
    for (time, state) in board.slots() {
        let mark = match state {
            SlotState::Open => "○",
            SlotState::Booked => "×",
            SlotState::Overnight => "-",
        };
        println!("{} {} {}", time, mark, state);
    }
}
