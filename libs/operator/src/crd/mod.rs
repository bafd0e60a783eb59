pub mod console;
pub mod console_authorisation;
pub mod console_template;
pub mod directory_role_binding;

pub use console::{Console, ConsolePhase, ConsoleSpec, ConsoleStatus};
pub use console_authorisation::{ConsoleAuthorisation, ConsoleAuthorisationSpec};
pub use console_template::{AuthorisationRule, ConsoleTemplate, ConsoleTemplateSpec};
pub use directory_role_binding::{DirectoryRoleBinding, DirectoryRoleBindingSpec, DirectoryRoleBindingStatus};

pub const GROUP: &str = "console.example.com";
pub const VERSION: &str = "v1alpha1";
