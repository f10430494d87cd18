//! Interactive command loops, one per vault type.
//!
//! All console I/O lives here and in the prompt; the engines only see the
//! capability traits.

use fidovault_core::envelope::MasterKey;
use fidovault_core::token::TokenProvider;
use fidovault_core::vault::{save_vault, SimpleVault, ThresholdVault, Vault, VaultBase};
use fidovault_core::{CoreConfig, Error, Prompt, Result, Store};

/// Everything a REPL session needs besides the vault itself.
pub struct Context<'a> {
    pub vault_path: &'a str,
    pub output: &'a str,
    pub config: &'a CoreConfig,
    pub store: &'a dyn Store,
    pub prompt: &'a dyn Prompt,
    pub provider: &'a dyn TokenProvider,
}

impl Context<'_> {
    /// Reads the next command, treating end of input as `quit`.
    fn next_command(&self) -> Result<Option<String>> {
        match self.prompt.ask("Enter command (? for help): ") {
            Ok(input) => Ok(Some(input)),
            Err(Error::UserAbort) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn save(&self, vault: &Vault) -> Result<()> {
        save_vault(self.store, self.vault_path, vault)
    }

    fn print_devices(&self) -> Result<()> {
        let devices = self.provider.enumerate()?;
        if devices.is_empty() {
            println!("No devices connected.");
            return Ok(());
        }
        println!("Connected devices:");
        for (i, device) in devices.iter().enumerate() {
            println!("{} -> {device}", i + 1);
        }
        println!();
        Ok(())
    }

    /// Prints the unlocked master key, or writes it to the output file.
    fn emit_master_key(&self, master: &MasterKey) -> Result<()> {
        if self.output.is_empty() || self.output == "1" || self.output == "stdout" {
            println!("Master Key (hex): {}", master.to_hex());
            return Ok(());
        }

        std::fs::write(self.output, master.as_bytes())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(self.output, std::fs::Permissions::from_mode(0o600))?;
        }
        println!("Master key written to output file.");
        Ok(())
    }
}

fn print_advanced_info(base: &VaultBase) {
    println!("Advanced Vault Info:");
    println!("  ID:   {}", base.id);
    println!("  Type: {}", base.kind);
    println!("  Ver:  {}", base.version);
    println!("  RPID: {}", base.rp_id);
    println!("  CDH:  {}", base.client_data_hash);
    println!("  Salt: {}", base.salt);
    println!();
}

fn print_help(commands: &[(&str, &str)], developer: bool) {
    println!("Commands:");
    for (name, what) in commands {
        println!("  {name}: {what}");
    }
    println!();
    println!("* changes are in memory only, you must save");
    println!("  them to disk manually using `save` or `done`");
    println!();
    if developer {
        println!("Developer:");
        println!("  D, devs:   list connected FIDO2 devices");
        println!("  I, info:   view advanced vault information");
        println!("  P, print:  print vault json to stdout");
        println!("  L, listv:  list headers verbosely (key entries)");
        println!();
    }
}

// Simple vaults

fn print_simple_info(vault: &SimpleVault, advanced: bool) {
    println!("Vault Info:");
    println!("  Type:    {}", vault.base.kind);
    println!("  Name:    {}", vault.base.name);
    println!("  Desc:    {}", vault.base.description.as_deref().unwrap_or(""));
    println!("  Keys:    {}", vault.headers.len());
    println!("  Created: {}", vault.base.metadata.created);
    println!("  Updated: {}", vault.base.metadata.modified);
    println!();
    if advanced {
        print_advanced_info(&vault.base);
    }
}

/// Runs the command loop for a simple vault.
pub fn run_simple(mut vault: SimpleVault, ctx: &Context<'_>) -> Result<()> {
    print_simple_info(&vault, ctx.config.debug);

    loop {
        let Some(input) = ctx.next_command()? else {
            return Ok(());
        };
        if input.is_empty() {
            continue;
        }
        println!();

        match input.as_str() {
            "?" | "??" | "h" | "help" | "help-all" => print_help(
                &[
                    ("l, list", "  list headers (key entries)"),
                    ("u, unlock", "unlock the master key"),
                    ("a, add", "   create a new header *"),
                    ("d, delete", "delete a header *"),
                    ("r, reset", " reset vault *"),
                    ("s, save", "  save vault to disk"),
                    ("q, quit", "  exit without saving"),
                    ("x, done", "  exit and save vault"),
                ],
                matches!(input.as_str(), "??" | "help-all"),
            ),

            "I" | "info" => print_simple_info(&vault, true),

            "D" | "devs" => ctx.print_devices()?,

            "l" | "list" => {
                println!("Keys:");
                for name in vault.header_names() {
                    println!("- {name}");
                }
            }

            "L" | "listv" | "listverbose" => {
                println!("Headers:");
                for (name, header) in &vault.headers {
                    println!(
                        "- {name}:\n\tcredential_id={}\n\tencrypted_key={}",
                        header.credential_id.to_hex(),
                        hex::encode(&header.encrypted_key)
                    );
                }
            }

            "a" | "add" => {
                vault.add(ctx.provider, ctx.prompt, ctx.config)?;
                println!("Key added!");
            }

            "u" | "unlock" => {
                let master = vault.unlock(ctx.provider, ctx.prompt, ctx.config)?;
                ctx.emit_master_key(&master)?;
            }

            "d" | "delete" => {
                let name = ctx.prompt.ask_non_empty("Enter key name to delete: ")?;
                match vault.delete(&name) {
                    Ok(()) => println!("Header deleted!"),
                    Err(Error::NoHeader) => println!("Header not found!"),
                    Err(err) => return Err(err),
                }
            }

            "s" | "save" | "w" | "write" => {
                ctx.save(&Vault::Simple(vault.clone()))?;
                println!("Saved!");
            }

            "r" | "reset" => {
                vault.reset();
                println!("Vault reset!");
            }

            "P" | "print" | "dump" => {
                let json = Vault::Simple(vault.clone()).to_json()?;
                print!("{}", String::from_utf8_lossy(&json));
            }

            "q" | "quit" | "cancel" => return Ok(()),

            "wq" | "x" | "done" | "exit" => {
                ctx.save(&Vault::Simple(vault.clone()))?;
                println!("Exiting and saving changes.");
                return Ok(());
            }

            _ => {}
        }

        println!();
    }
}

// Threshold vaults

fn print_threshold_info(vault: &ThresholdVault, advanced: bool) {
    println!("Vault Info:");
    println!("  Type:    {}", vault.base.kind);
    println!("  Name:    {}", vault.base.name);
    println!("  Desc:    {}", vault.base.description.as_deref().unwrap_or(""));
    println!("  K/N:     {} / {}", vault.k, vault.n);
    println!(
        "  Ready:   {}",
        if vault.is_initialized() { "YES" } else { "NO" }
    );
    println!("  Created: {}", vault.base.metadata.created);
    println!("  Updated: {}", vault.base.metadata.modified);
    println!();
    if advanced {
        print_advanced_info(&vault.base);
    }
}

/// Runs the command loop for a threshold vault.
pub fn run_threshold(mut vault: ThresholdVault, ctx: &Context<'_>) -> Result<()> {
    print_threshold_info(&vault, ctx.config.debug);

    if vault.shares.is_empty() {
        println!("This vault is not initialized. Use `init` to begin.");
        println!();
    }

    loop {
        let Some(input) = ctx.next_command()? else {
            return Ok(());
        };
        if input.is_empty() {
            continue;
        }
        println!();

        match input.as_str() {
            "?" | "??" | "h" | "help" | "help-all" => print_help(
                &[
                    ("i, init", "  initialize the vault with all N keys *"),
                    ("l, list", "  list headers (key entries)"),
                    ("u, unlock", "unlock the master key"),
                    ("r, reset", " reset vault *"),
                    ("s, save", "  save vault to disk"),
                    ("q, quit", "  exit without saving"),
                    ("x, done", "  exit and save vault"),
                ],
                matches!(input.as_str(), "??" | "help-all"),
            ),

            "I" | "info" => print_threshold_info(&vault, true),

            "D" | "devs" => ctx.print_devices()?,

            "i" | "init" => {
                vault.initialize(ctx.provider, ctx.prompt, ctx.config)?;
                println!("Initialized!");
            }

            "l" | "list" => {
                println!("Shares:");
                for (index, header) in &vault.shares {
                    println!("{index}: {}", header.name);
                }
            }

            "L" | "listv" | "listverbose" => {
                println!("Shares:");
                for (index, header) in &vault.shares {
                    println!(
                        "{index}: {}\n\tcredential_id={}\n\tencrypted_key={}",
                        header.name,
                        header.credential_id.to_hex(),
                        hex::encode(&header.encrypted_key)
                    );
                }
            }

            "u" | "unlock" => {
                let master = vault.unlock(ctx.provider, ctx.prompt, ctx.config)?;
                ctx.emit_master_key(&master)?;
            }

            "s" | "save" | "w" | "write" => {
                ctx.save(&Vault::Threshold(vault.clone()))?;
                println!("Saved!");
            }

            "r" | "reset" => {
                vault.reset();
                println!("Vault reset!");
            }

            "P" | "print" | "dump" => {
                let json = Vault::Threshold(vault.clone()).to_json()?;
                print!("{}", String::from_utf8_lossy(&json));
            }

            "q" | "quit" | "cancel" => return Ok(()),

            "wq" | "x" | "done" | "exit" => {
                ctx.save(&Vault::Threshold(vault.clone()))?;
                println!("Exiting and saving changes.");
                return Ok(());
            }

            _ => {}
        }

        println!();
    }
}
