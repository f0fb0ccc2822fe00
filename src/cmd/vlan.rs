use clap::Args;
use color_eyre::eyre::{Result, WrapErr};
use std::net::Ipv4Addr;
use ztp_gateway::DeviceGateway;
use ztp_vlan::{port_vlans, vlan_table};

use crate::cmd::bitmap::join_ports;
use crate::settings::Settings;

#[derive(Args, Debug)]
pub struct VlanArgs {
    /// Switch address
    pub switch: Ipv4Addr,

    /// Only show the VLANs of this port
    #[arg(short, long)]
    pub port: Option<u16>,
}

pub async fn run_vlan(args: VlanArgs, settings: &Settings) -> Result<()> {
    let gateway = settings.device_gateway()?;

    if let Some(port) = args.port {
        if let Some(description) = gateway
            .get_port_description(args.switch, port)
            .await
            .wrap_err("cannot read port description")?
        {
            println!("Port {port}: {description}");
        }
        let vlans = port_vlans(&gateway, args.switch, port)
            .await
            .wrap_err_with(|| format!("cannot read VLANs of {} port {}", args.switch, port))?;
        println!("untagged: {}", join_ports(&vlans.untagged));
        println!("tagged:   {}", join_ports(&vlans.tagged));
        return Ok(());
    }

    let table = vlan_table(&gateway, args.switch)
        .await
        .wrap_err_with(|| format!("cannot read VLAN table of {}", args.switch))?;
    for (vlan, membership) in table {
        println!(
            "VLAN {:>4}  untagged: [{}]  tagged: [{}]",
            vlan,
            join_ports(&membership.untagged),
            join_ports(&membership.tagged)
        );
    }
    Ok(())
}
