use super::cli_main::{get_user_input, prompt};
use crate::Examples::gc_examples::gc_examples;

pub fn examples_menu() {
    loop {
        println!("\n=== Examples ===");
        println!("1. Decomposition into groups");
        println!("2. Training and regression report");
        println!("3. Estimation of formation energies");
        println!("4. Reaction energies");
        println!("5. Leave-one-out cross validation");
        println!("0. Back to main menu");
        prompt("Enter your choice: ");

        let choice = get_user_input();
        match choice.trim() {
            "1" => gc_examples(0),
            "2" => gc_examples(1),
            "3" => gc_examples(2),
            "4" => gc_examples(3),
            "5" => gc_examples(4),
            "0" => break,
            _ => println!("Invalid choice. Please try again."),
        }
    }
}
