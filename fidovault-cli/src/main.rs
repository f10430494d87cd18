//! fidovault: protect a master key behind FIDO2 hardware security keys.

mod prompt;
mod repl;
mod store;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use fidovault_core::token::hid::HidTokenProvider;
use fidovault_core::vault::{load_vault, SimpleVault, ThresholdVault, Vault};
use fidovault_core::{CoreConfig, Error, Prompt, Result};

use crate::prompt::{FileInputPrompt, StdinPrompt};
use crate::store::FileStore;

/// Protect a master key behind FIDO2 hardware security keys.
#[derive(Debug, Parser)]
#[command(name = "fidovault", version, about)]
struct Args {
    /// The relative path to your vault.
    #[arg(short = 'v', long, default_value = "vault.json")]
    vault: String,

    /// The file path to read the master key from during initialization.
    #[arg(short = 'i', long, default_value = "stdin")]
    input: String,

    /// The file path to write the output to during unlocking.
    #[arg(short = 'o', long, default_value = "stdout")]
    output: String,

    /// Enable debug mode.
    #[arg(short = 'D', long)]
    debug: bool,

    /// Disable biometric authentication; always use PIN.
    #[arg(long)]
    disable_biometrics: bool,

    /// Always prompt to press ENTER before selecting a key. Useful if you
    /// need more time or have unusual requirements for which keys are
    /// plugged in when.
    #[arg(long)]
    no_assumptions: bool,

    /// Skip vault integrity verification (for recovery attempts).
    #[arg(long)]
    skip_checks: bool,
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if args.debug { "debug" } else { "warn" }),
    )
    .init();

    let config = CoreConfig {
        debug: args.debug,
        disable_biometrics: args.disable_biometrics,
        make_assumptions: !args.no_assumptions,
        skip_checks: args.skip_checks,
    };

    #[cfg(target_os = "linux")]
    warn_if_missing_plugdev();

    if let Err(err) = run(&args, &config) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(args: &Args, config: &CoreConfig) -> Result<()> {
    let prompt: Arc<dyn Prompt> = if args.input.is_empty() || args.input == "stdin" {
        Arc::new(StdinPrompt::new())
    } else {
        Arc::new(FileInputPrompt::new(StdinPrompt::new(), &args.input)?)
    };
    let provider = HidTokenProvider::new(Arc::clone(&prompt));
    let store = FileStore;

    let vault = if Path::new(&args.vault).exists() {
        match load_vault(&store, &args.vault, config) {
            Ok(vault) => vault,
            Err(
                err @ (Error::Corrupt { .. }
                | Error::ShareCountMismatch { .. }
                | Error::ThresholdOutOfRange { .. }),
            ) => {
                print_corruption_guidance();
                return Err(err);
            }
            Err(err) => return Err(err),
        }
    } else {
        println!("Vault file does not exist. Creating new vault.");
        create_vault(prompt.as_ref())?
    };

    let ctx = repl::Context {
        vault_path: &args.vault,
        output: &args.output,
        config,
        store: &store,
        prompt: prompt.as_ref(),
        provider: &provider,
    };

    match vault {
        Vault::Simple(vault) => repl::run_simple(vault, &ctx),
        Vault::Threshold(vault) => repl::run_threshold(vault, &ctx),
    }
}

fn create_vault(prompt: &dyn Prompt) -> Result<Vault> {
    loop {
        let kind = prompt.ask("Enter vault type (simple, shamir): ")?;
        match kind.as_str() {
            "simple" => {
                let (name, description) = ask_name_and_description(prompt)?;
                return Ok(Vault::Simple(SimpleVault::create(name, description)?));
            }
            "shamir" => {
                let (name, description) = ask_name_and_description(prompt)?;
                let n = ask_byte(prompt, "Enter value for n (total shares): ")?;
                let k = ask_byte(prompt, "Enter value for k (min required): ")?;
                return Ok(Vault::Threshold(ThresholdVault::create(
                    name,
                    description,
                    k,
                    n,
                )?));
            }
            _ => {}
        }
    }
}

fn ask_name_and_description(prompt: &dyn Prompt) -> Result<(String, Option<String>)> {
    let name = prompt.ask("Enter vault name: ")?;
    let description = prompt.ask("Enter vault description: ")?;
    let description = (!description.is_empty()).then_some(description);
    Ok((name, description))
}

fn ask_byte(prompt: &dyn Prompt, label: &str) -> Result<u8> {
    loop {
        let value = prompt.ask_non_empty(label)?;
        match value.parse() {
            Ok(parsed) => return Ok(parsed),
            Err(_) => println!("Enter a number between 0 and 255."),
        }
    }
}

fn print_corruption_guidance() {
    println!("The vault file appears to be corrupted.");
    println!();
    println!("This usually happens if the vault file was modified manually.");
    println!("If you are sure that the vault was not modified manually, then");
    println!("there may be a bug somewhere in this program or in the integrity");
    println!("verification process which needs to be resolved.");
    println!();
    println!("You should first back up the current version of the vault file,");
    println!("then try running the program using --skip-checks. This may work if");
    println!("the vault corruption is not severe, for example if some keys in a");
    println!("threshold vault are erroneously deleted, but K or more are still there.");
    println!();
    println!("If some fields are missing or empty, you may be able to manually");
    println!("set them to recover the vault. You should create a backup of the");
    println!("current state of the vault file before attempting this.");
    println!();
    println!("Here are some examples of required fields which might be missing:");
    println!("\t\"version\": 0,");
    println!("\t\"client_data_hash\": \"create-credential\",");
    println!("\t\"salt\": \"vault-master-key\",");
    println!("\t\"rp_id\": \"crypto.zyte.dev\",");
    println!();
}

/// Security keys speak raw HID on Linux; without a udev rule the device
/// nodes are only open to root and the `plugdev` group.
#[cfg(target_os = "linux")]
fn warn_if_missing_plugdev() {
    use nix::unistd::{getgroups, Group, Uid};

    if Uid::effective().is_root() {
        return;
    }
    // No plugdev group on this system: nothing to be a member of.
    let Ok(Some(group)) = Group::from_name("plugdev") else {
        return;
    };
    let in_group = getgroups()
        .map(|gids| gids.contains(&group.gid))
        .unwrap_or(true);
    if !in_group {
        println!("Detected Linux, and current user is not in `plugdev` group.");
        println!("Security keys may not work unless this program runs as root,");
        println!("or if the effective user is a member of the `plugdev` group.");
        println!("If this message is unexpected, you may need to add a udev rule.");
        println!("Read more: https://developers.yubico.com/libfido2");
    }
}
