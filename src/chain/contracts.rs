//! ABI bindings for the membership contract and its payment token.

use alloy::sol;

sol! {
    /// Membership registry: plans, cycles, members and referral payouts.
    #[derive(Debug)]
    interface IMembership {
        function getPlan(uint256 planId) external view returns (uint256 price, string name, uint256 cycleCapacity, bool active);
        function getPlanCycle(uint256 planId) external view returns (uint256 currentCycle, uint256 membersInCycle);
        function getMember(address wallet) external view returns (bool registered, address upline, uint256 referralCount, uint256 earnings, uint256 planId, uint256 cycleNumber, uint256 registeredAt, bool hasNft);
        function getSystemStats() external view returns (uint256 totalMembers, uint256 totalVolume, uint256 totalReferralPaid);
        function register(address member, address upline, uint256 planId) external;
        function upgrade(address member, uint256 planId) external;
    }

    /// Payment token used to buy plans.
    #[derive(Debug)]
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function decimals() external view returns (uint8);
    }
}

sol! {
    /// Emitted when a wallet joins a plan.
    #[derive(Debug)]
    event MemberRegistered(address indexed member, address indexed upline, uint256 planId, uint256 cycleNumber);

    /// Emitted when a member moves to a higher plan.
    #[derive(Debug)]
    event PlanUpgraded(address indexed member, uint256 fromPlan, uint256 toPlan, uint256 cycleNumber);

    /// Emitted for each referral commission transfer.
    #[derive(Debug)]
    event ReferralPaid(address indexed recipient, address indexed payer, uint256 amount, uint256 planId);
}
