//! Terminal client: stdin lines go out as messages, relayed texts are
//! printed one per line.

use std::future::Future;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::{
    io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
    select,
};
use tracing::{info, warn};

use crate::{
    cli::ClientArgs,
    connection::Connection,
    error::ReadError,
    message::Message,
    transport::tcp,
};

pub async fn run(args: ClientArgs) -> Result<()> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;
    info!(server = %args.server, "connected to relay");

    let interrupted = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(?error, "ctrl-c handler failed");
        }
    };

    let mut stdout = io::stdout();
    chat(
        tcp::connection(stream),
        BufReader::new(io::stdin()),
        &mut stdout,
        interrupted,
    )
    .await
}

enum Step {
    Relayed(Option<Result<Message, ReadError>>),
    Typed(io::Result<Option<String>>),
    Interrupted,
}

/// Pumps `input` lines to the relay and relayed texts to `output` until the
/// user leaves, the relay hangs up, or `interrupted` resolves.
///
/// Both reads live outside the `select!`: the relay stream and the line
/// reader keep any partially read line when the other branch wins.
async fn chat<I, O, F>(
    connection: Connection,
    input: I,
    output: &mut O,
    interrupted: F,
) -> Result<()>
where
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
    F: Future<Output = ()>,
{
    let Connection {
        mut source,
        mut sink,
        ..
    } = connection;
    let mut lines = input.lines();
    tokio::pin!(interrupted);

    loop {
        let step = select! {
            relayed = source.next() => Step::Relayed(relayed),
            typed = lines.next_line() => Step::Typed(typed),
            () = &mut interrupted => Step::Interrupted,
        };

        match step {
            Step::Relayed(Some(message)) => print_line(output, &message?.text).await?,
            Step::Relayed(None) => {
                print_line(output, "*** relay closed the connection").await?;
                break;
            }
            Step::Typed(line) => match line? {
                None => break,
                Some(line) if line.is_empty() => {}
                Some(line) if line.eq_ignore_ascii_case("/quit") => {
                    print_line(output, "*** leaving relay").await?;
                    break;
                }
                Some(line) => sink.send(Message::new(line)).await?,
            },
            Step::Interrupted => break,
        }
    }

    if let Err(error) = sink.close().await {
        warn!(%error, "failed to close connection cleanly");
    }
    Ok(())
}

async fn print_line<O>(output: &mut O, text: &str) -> io::Result<()>
where
    O: AsyncWrite + Unpin,
{
    output.write_all(text.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await
}
