use crate::core::config::data::{path_display, Config};
use crate::core::config::defaults::DEFAULT_PROFILE_NAME;

impl Config {
    pub fn print_all(&self) {
        println!("Current configuration:");
        println!("  base-url: {}", self.base_url());
        match &self.model {
            Some(model) => println!("  model: {model}"),
            None => println!("  model: (discover from server)"),
        }
        match &self.default_profile {
            Some(profile) => println!("  default-profile: {profile}"),
            None => println!("  default-profile: (unset)"),
        }
        println!("  chat-timeout: {}s", self.chat_timeout().as_secs());
        println!("  title-timeout: {}s", self.title_timeout().as_secs());
        println!("  temperature: {}", self.transport_options().temperature);
        match self.max_tokens.filter(|tokens| *tokens > 0) {
            Some(tokens) => println!("  max-tokens: {tokens}"),
            None => println!("  max-tokens: (server default)"),
        }
        println!("  save-debounce-ms: {}", self.save_debounce().as_millis());
        match self.state_path() {
            Ok(path) => println!("  state-file: {}", path_display(path)),
            Err(err) => println!("  state-file: ({err})"),
        }
        self.print_profiles();
    }

    pub fn print_profiles(&self) {
        if self.profiles.is_empty() {
            println!("  profiles: (none; using built-in \"{DEFAULT_PROFILE_NAME}\")");
            return;
        }
        println!("  profiles:");
        for profile in &self.profiles {
            let marker = match &self.default_profile {
                Some(default) if default.eq_ignore_ascii_case(&profile.name) => "*",
                _ => " ",
            };
            println!("   {marker} {}", profile.name);
        }
    }
}
