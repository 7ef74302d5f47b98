/// Macro to create a configuration value group struct.
///
/// Usage:
/// ```rust
/// mod retry {
///     recon_config::config_group!({
///         /// How many times to try.
///         ref attempts: usize = 3;
///         ref label: String = "default".to_string();
///     });
/// }
///
/// let group = retry::ConfigValueGroup::new();
/// assert_eq!(group.attempts, 3);
/// ```
///
/// This creates a `ConfigValueGroup` struct in the invoking module.  `apply_env_overrides`
/// reads `RECON_<GROUP>_<FIELD>`, where `<GROUP>` is the last segment of the module path.
#[macro_export]
macro_rules! config_group {
    ({
        $(
            $(#[$meta:meta])*
            ref $name:ident : $type:ty = $value:expr;
        )+
    }) => {
        #[allow(unused_imports)]
        use $crate::ParsableConfigValue;

        /// ConfigValueGroup struct containing all configurable values
        #[derive(Debug, Clone)]
        pub struct ConfigValueGroup {
            $(
                $(#[$meta])*
                #[allow(non_snake_case)]
                pub $name: $type,
            )+
        }

        impl Default for ConfigValueGroup {
            fn default() -> Self {
                Self {
                    $(
                        $name: {
                            let v: $type = $value;
                            v
                        },
                    )+
                }
            }
        }

        impl ConfigValueGroup {
            /// Default values only, no environment overrides.
            pub fn new() -> Self {
                Self::default()
            }

            /// Name of the group, used as the middle segment of the env var names.
            pub fn group_name() -> &'static str {
                module_path!().rsplit("::").next().unwrap_or("unknown")
            }

            /// Apply environment variable overrides to this configuration group.
            pub fn apply_env_overrides(&mut self) {
                let group_name = Self::group_name().to_uppercase();

                $(
                    let env_var_name = format!(
                        "{}{}_{}",
                        $crate::ENV_PREFIX,
                        group_name,
                        stringify!($name).to_uppercase()
                    );
                    let maybe_env_value = std::env::var(&env_var_name).ok();
                    let current = std::mem::replace(&mut self.$name, { let v: $type = $value; v });
                    self.$name = <$type>::parse(&env_var_name, maybe_env_value, current);
                )+
            }
        }
    };
}
