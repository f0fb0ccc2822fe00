use clap::{Args, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use ztp_vlan::{decode, encode, PortSet};

#[derive(Args, Debug)]
pub struct BitmapArgs {
    #[command(subcommand)]
    pub action: BitmapAction,
}

#[derive(Subcommand, Debug)]
pub enum BitmapAction {
    /// Print the ports set in a bitmap, e.g. `0xff00`
    Decode { bitmap: String },
    /// Print the bitmap for a list of ports
    Encode {
        /// Width of the bitmap in hex digits (four ports per digit)
        #[arg(short, long)]
        digits: usize,
        /// Port numbers, starting at 1
        #[arg(required = true)]
        ports: Vec<u16>,
    },
}

pub fn run_bitmap(args: BitmapArgs) -> Result<()> {
    match args.action {
        BitmapAction::Decode { bitmap } => {
            let ports = decode(&bitmap).wrap_err("cannot decode bitmap")?;
            println!("{}", join_ports(&ports));
        }
        BitmapAction::Encode { digits, ports } => {
            let ports: PortSet = ports.into_iter().collect();
            println!("{}", encode(&ports, digits).wrap_err("cannot encode ports")?);
        }
    }
    Ok(())
}

pub fn join_ports<'a>(ports: impl IntoIterator<Item = &'a u16>) -> String {
    ports
        .into_iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
