use console_operator::crd::{Console, ConsoleAuthorisation, ConsoleTemplate, DirectoryRoleBinding};

use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    for crd in [
        Console::crd(),
        ConsoleTemplate::crd(),
        ConsoleAuthorisation::crd(),
        DirectoryRoleBinding::crd(),
    ] {
        println!("---");
        println!("{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
